/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The mutable, externally visible state of a GPU resource.
//!
//! A [`ResourceState`] is pure data: it issues no commands and validates
//! no transitions. Legality is the transition planner's concern. Exactly
//! one record exists per physical resource, stored in the device arena;
//! every handle and internal object refers to it by id.

/// How a resource's memory is currently organized and accessible.
///
/// The vocabulary follows the Vulkan image layouts the runtime actually
/// transitions between; other backends map these onto their own notions
/// (or ignore them entirely).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined; the only layout a resource may be *in* but
    /// never transitioned *to*.
    Undefined,
    General,
    ColorAttachmentOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    ShaderReadOnlyOptimal,
    Present,
}

/// Which execution queue currently owns a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueOwner {
    /// Ownership is not being tracked; no transfer barriers are needed.
    Ignored,
    /// Owned outside this runtime (interop); we can release to it or
    /// acquire from it, but never record on its behalf.
    External,
    /// Owned by a foreign device or process. Same one-sided rules as
    /// `External`.
    Foreign,
    /// A concrete queue family under this runtime's authority.
    Family(u32),
}

impl QueueOwner {
    /// True for the owners that stand in for "outside our command-stream
    /// authority".
    pub fn is_sentinel(self) -> bool {
        match self {
            QueueOwner::Ignored | QueueOwner::External | QueueOwner::Foreign => true,
            QueueOwner::Family(_) => false,
        }
    }

    pub fn family(self) -> Option<u32> {
        match self {
            QueueOwner::Family(index) => Some(index),
            _ => None,
        }
    }
}

/// The tracked layout and ownership of one resource.
///
/// Note: this is the *believed* state. By convention the record is
/// updated as soon as transition commands are recorded, so it describes
/// the state the resource will be in once the recorded commands execute,
/// not necessarily its state on the device right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceState {
    pub layout: ImageLayout,
    pub owner: QueueOwner,
}

impl ResourceState {
    pub fn new(layout: ImageLayout, owner: QueueOwner) -> Self {
        Self { layout, owner }
    }

    /// The seed for a wrapped resource whose state the caller could not
    /// vouch for.
    pub(crate) const UNKNOWN: Self = Self {
        layout: ImageLayout::Undefined,
        owner: QueueOwner::Ignored,
    };

    pub fn get(&self) -> (ImageLayout, QueueOwner) {
        (self.layout, self.owner)
    }

    /// Overwrite both fields. Bookkeeping only; no commands are issued
    /// on behalf of this call.
    pub fn set(&mut self, layout: ImageLayout, owner: QueueOwner) {
        self.layout = layout;
        self.owner = owner;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sentinels() {
        assert!(QueueOwner::Ignored.is_sentinel());
        assert!(QueueOwner::External.is_sentinel());
        assert!(QueueOwner::Foreign.is_sentinel());
        assert!(!QueueOwner::Family(0).is_sentinel());
        assert_eq!(QueueOwner::Family(3).family(), Some(3));
        assert_eq!(QueueOwner::External.family(), None);
    }

    #[test]
    fn record_set_overwrites_both_fields() {
        let mut state = ResourceState::new(ImageLayout::General, QueueOwner::Family(1));
        state.set(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored);
        assert_eq!(
            state.get(),
            (ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored)
        );
    }
}
