/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::{
    id::Id,
    Epoch, Index,
};

use std::marker::PhantomData;

/// An entry in a `Storage::map` table.
#[derive(Debug)]
pub(crate) enum Element<T> {
    /// There are no live ids with this index. Keeps the epoch of the
    /// last occupant so a re-used index gets a fresh id.
    Vacant(Epoch),

    /// There is one live id with this index, allocated at the given
    /// epoch.
    Occupied(T, Epoch),

    /// Like `Occupied`, but the resource has been marked as destroyed
    /// and its native object hasn't been freed yet.
    Destroyed(T, Epoch),
}

#[derive(Clone, Debug)]
pub(crate) struct InvalidId;

/// A table of `T` values indexed by ids with the marker type `M`.
///
/// Indices are recycled through a free list, so they stay dense; the
/// epoch stored next to each element catches stale ids from earlier
/// occupants of the same index.
#[derive(Debug)]
pub(crate) struct Storage<T, M> {
    map: Vec<Element<T>>,
    free: Vec<Index>,
    kind: &'static str,
    _marker: PhantomData<M>,
}

impl<T, M> Storage<T, M> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            map: Vec::new(),
            free: Vec::new(),
            kind,
            _marker: PhantomData,
        }
    }

    pub(crate) fn contains(&self, id: Id<M>) -> bool {
        let (index, epoch) = id.unzip();
        match self.map.get(index as usize) {
            Some(&Element::Occupied(_, storage_epoch)) => storage_epoch == epoch,
            _ => false,
        }
    }

    /// Get a reference to an item behind a potentially invalid ID.
    ///
    /// Returns [`InvalidId`] on an epoch mismatch or a vacant/destroyed
    /// entry.
    pub(crate) fn get(&self, id: Id<M>) -> Result<&T, InvalidId> {
        let (index, epoch) = id.unzip();
        match self.map.get(index as usize) {
            Some(&Element::Occupied(ref v, storage_epoch)) if storage_epoch == epoch => Ok(v),
            _ => Err(InvalidId),
        }
    }

    pub(crate) fn get_mut(&mut self, id: Id<M>) -> Result<&mut T, InvalidId> {
        let (index, epoch) = id.unzip();
        match self.map.get_mut(index as usize) {
            Some(&mut Element::Occupied(ref mut v, storage_epoch)) if storage_epoch == epoch => {
                Ok(v)
            }
            _ => Err(InvalidId),
        }
    }

    /// Like `get`, but also returns the element if it is destroyed.
    ///
    /// Most entry points should use `get` so that a destroyed resource
    /// leads to a validation error. This is used internally where some
    /// bookkeeping still has to happen after destruction.
    pub(crate) fn get_occupied_or_destroyed(&self, id: Id<M>) -> Result<&T, InvalidId> {
        let (index, epoch) = id.unzip();
        match self.map.get(index as usize) {
            Some(&Element::Occupied(ref v, storage_epoch))
            | Some(&Element::Destroyed(ref v, storage_epoch))
                if storage_epoch == epoch =>
            {
                Ok(v)
            }
            _ => Err(InvalidId),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> Id<M> {
        match self.free.pop() {
            Some(index) => {
                let epoch = match self.map[index as usize] {
                    Element::Vacant(last_epoch) => last_epoch + 1,
                    _ => panic!("{}[{}] is in the free list but not vacant", self.kind, index),
                };
                self.map[index as usize] = Element::Occupied(value, epoch);
                Id::zip(index, epoch)
            }
            None => {
                let index = self.map.len() as Index;
                self.map.push(Element::Occupied(value, 1));
                Id::zip(index, 1)
            }
        }
    }

    /// Move an occupied element into the destroyed limbo state, keeping
    /// the value accessible for deferred cleanup.
    pub(crate) fn mark_destroyed(&mut self, id: Id<M>) -> Result<&mut T, InvalidId> {
        let (index, epoch) = id.unzip();
        let slot = match self.map.get_mut(index as usize) {
            Some(slot) => slot,
            None => return Err(InvalidId),
        };
        // borrowck dance: move the element out before replacing it with
        // another variant holding the same value.
        if let &mut Element::Occupied(_, storage_epoch) = slot {
            if storage_epoch == epoch {
                if let Element::Occupied(value, e) = std::mem::replace(slot, Element::Vacant(0)) {
                    *slot = Element::Destroyed(value, e);
                }
            }
        }
        match slot {
            &mut Element::Destroyed(ref mut value, storage_epoch) if storage_epoch == epoch => {
                Ok(value)
            }
            _ => Err(InvalidId),
        }
    }

    pub(crate) fn remove(&mut self, id: Id<M>) -> Option<T> {
        let (index, epoch) = id.unzip();
        match std::mem::replace(&mut self.map[index as usize], Element::Vacant(epoch)) {
            Element::Occupied(value, storage_epoch) | Element::Destroyed(value, storage_epoch) => {
                assert_eq!(
                    epoch, storage_epoch,
                    "{}[{}] is no longer alive",
                    self.kind, index
                );
                self.free.push(index);
                Some(value)
            }
            Element::Vacant(last_epoch) => {
                self.map[index as usize] = Element::Vacant(last_epoch);
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::markers::Texture;

    #[test]
    fn reuse_bumps_epoch() {
        let mut storage = Storage::<u32, Texture>::new("Texture");
        let a = storage.insert(10);
        assert!(storage.contains(a));
        assert_eq!(storage.remove(a), Some(10));
        assert!(!storage.contains(a));

        let b = storage.insert(20);
        // same index, different epoch
        assert_eq!(a.unzip().0, b.unzip().0);
        assert_ne!(a, b);
        assert!(storage.get(a).is_err());
        assert_eq!(*storage.get(b).unwrap(), 20);
    }

    #[test]
    fn destroyed_is_invalid_but_reachable() {
        let mut storage = Storage::<u32, Texture>::new("Texture");
        let id = storage.insert(7);
        storage.mark_destroyed(id).unwrap();
        assert!(storage.get(id).is_err());
        assert_eq!(*storage.get_occupied_or_destroyed(id).unwrap(), 7);
        // a second destroy is an error
        assert!(storage.mark_destroyed(id).is_err());
    }
}
