/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::{Epoch, Index};

use std::{fmt, marker::PhantomData};

/// An identifier for an arena slot, packing the slot index together with
/// an epoch that distinguishes re-uses of the same index.
///
/// Ids are handed out by the device and stored inside every handle and
/// internal object that aliases the same resource. They are the shared
/// reference: copying an id never copies the state record it points at.
#[repr(transparent)]
pub struct Id<T>(u64, PhantomData<T>);

impl<T> Id<T> {
    pub(crate) fn zip(index: Index, epoch: Epoch) -> Self {
        Id(index as u64 | ((epoch as u64) << 32), PhantomData)
    }

    pub(crate) fn unzip(self) -> (Index, Epoch) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self(self.0, PhantomData)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.unzip().fmt(formatter)
    }
}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Id<T> {}

/// Marker types for the phantom parameter of [`Id`].
///
/// Using markers instead of the resource structs themselves keeps ids
/// independent of the backend type parameter.
pub(crate) mod markers {
    #[derive(Debug)]
    pub enum Texture {}
}

pub type TextureId = Id<markers::Texture>;

#[test]
fn test_id_roundtrip() {
    let id = TextureId::zip(37, 2);
    assert_eq!(id.unzip(), (37, 2));
    assert_eq!(id, id.clone());
    assert_ne!(id, TextureId::zip(37, 3));
}
