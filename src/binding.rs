/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Tracking of driver binding slots.
//!
//! The driver's (unit, target) binding table is global state we do not
//! exclusively own: any raw driver call made outside the runtime can
//! rebind slots without us noticing. The cache records what we last
//! bound so redundant binds can be skipped, and is wholesale invalidated
//! whenever control returns from a region of raw driver access. A stale
//! entry that survives a missed invalidation shows up as silently wrong
//! sampling, which is why the tests probe driver-reported bindings and
//! never the cache itself.

use crate::hal::{self, BindTarget};

/// Last-known-bound native handle per (unit, target) pair.
#[derive(Debug)]
pub(crate) struct BindingCache<A: hal::Api> {
    units: Vec<[Option<A::TextureHandle>; BindTarget::COUNT]>,
}

impl<A: hal::Api> BindingCache<A> {
    pub(crate) fn new(unit_count: u32) -> Self {
        Self {
            units: vec![[None; BindTarget::COUNT]; unit_count as usize],
        }
    }

    /// Record belief after an internal bind.
    pub(crate) fn assume_bound(&mut self, unit: u32, target: BindTarget, raw: A::TextureHandle) {
        debug_assert!((unit as usize) < self.units.len(), "texture unit {} out of range", unit);
        if let Some(slots) = self.units.get_mut(unit as usize) {
            slots[target.index()] = Some(raw);
        }
    }

    /// Whether binding `raw` on (unit, target) would be redundant
    /// according to the cache.
    pub(crate) fn needs_bind(&self, unit: u32, target: BindTarget, raw: A::TextureHandle) -> bool {
        match self.units.get(unit as usize) {
            Some(slots) => slots[target.index()] != Some(raw),
            None => true,
        }
    }

    /// Forget every assumption. The next bind on each slot will be
    /// unconditional.
    pub(crate) fn invalidate_all(&mut self) {
        for slots in self.units.iter_mut() {
            *slots = [None; BindTarget::COUNT];
        }
    }

    #[cfg(test)]
    fn cached(&self, unit: u32, target: BindTarget) -> Option<A::TextureHandle> {
        self.units[unit as usize][target.index()]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::noop;

    #[test]
    fn miss_then_hit() {
        let mut cache = BindingCache::<noop::Api>::new(4);
        assert!(cache.needs_bind(0, BindTarget::D2, 17));
        cache.assume_bound(0, BindTarget::D2, 17);
        assert!(!cache.needs_bind(0, BindTarget::D2, 17));
        // a different handle, target, or unit still misses
        assert!(cache.needs_bind(0, BindTarget::D2, 18));
        assert!(cache.needs_bind(0, BindTarget::External, 17));
        assert!(cache.needs_bind(1, BindTarget::D2, 17));
    }

    #[test]
    fn invalidate_clears_every_slot() {
        let mut cache = BindingCache::<noop::Api>::new(2);
        cache.assume_bound(0, BindTarget::D2, 5);
        cache.assume_bound(1, BindTarget::Rectangle, 6);
        cache.invalidate_all();
        assert_eq!(cache.cached(0, BindTarget::D2), None);
        assert_eq!(cache.cached(1, BindTarget::Rectangle), None);
        assert!(cache.needs_bind(0, BindTarget::D2, 5));
        assert!(cache.needs_bind(1, BindTarget::Rectangle, 6));
    }
}
