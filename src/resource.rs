/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::{
    device::Device,
    hal,
    id::TextureId,
    state::{ImageLayout, QueueOwner, ResourceState},
    LifeGuard,
};

use bitflags::bitflags;
use thiserror::Error;

use std::fmt;

pub type Label<'a> = Option<&'a str>;

/// An operation was attempted through a handle whose resource is
/// destroyed or was never valid. A programmer error, but reported as a
/// recoverable validation failure so a stale handle cannot take the
/// process down.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("texture is invalid or has been destroyed")]
pub struct InvalidResource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
}

bitflags! {
    /// Ways a texture may be used over its lifetime.
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const COLOR_TARGET = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDescriptor<'a> {
    pub label: Label<'a>,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor<'_> {
    /// The largest mip chain the dimensions allow.
    pub fn max_mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).leading_zeros()
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum CreateTextureError {
    #[error(transparent)]
    Allocation(#[from] hal::AllocationError),
    #[error("texture size {width}x{height} must be non-zero")]
    ZeroDimension { width: u32, height: u32 },
    #[error("mip level count {requested} exceeds the maximum of {maximum}")]
    InvalidMipLevelCount { requested: u32, maximum: u32 },
    #[error("usage flags must not be empty")]
    EmptyUsage,
}

/// The arena entry holding everything the device tracks about one
/// texture, including the single [`ResourceState`] record every alias
/// reads and writes.
#[derive(Debug)]
pub(crate) struct TextureSlot<A: hal::Api> {
    /// The native object; taken out once it has been freed or handed
    /// off.
    pub(crate) raw: Option<A::TextureHandle>,
    pub(crate) state: ResourceState,
    /// Whether the tracked state was seeded from a trusted source (our
    /// own allocation, or a caller-pinned wrap). An untrusted slot's
    /// first executed transition must assume an unknown starting layout.
    pub(crate) trusted: bool,
    /// Whether we own native destruction.
    pub(crate) owned: bool,
    pub(crate) life_guard: LifeGuard,
    pub(crate) label: String,
}

/// A lightweight, copyable reference to a GPU texture.
///
/// Cloning a handle duplicates the reference, never the state record:
/// all copies observe mutations through any of them immediately.
#[derive(Clone)]
pub struct BackendTexture<A: hal::Api> {
    pub(crate) id: TextureId,
    pub(crate) raw: A::TextureHandle,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: TextureFormat,
}

impl<A: hal::Api> fmt::Debug for BackendTexture<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BackendTexture")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl<A: hal::Api> BackendTexture<A> {
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// The backend-native identity token.
    pub fn raw(&self) -> A::TextureHandle {
        self.raw
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// True iff the handle still references a live allocation on the
    /// given device.
    pub fn is_valid(&self, device: &Device<A>) -> bool {
        device.is_texture_valid(self)
    }

    /// Read the shared state record. See
    /// [`Device::texture_state`](crate::device::Device::texture_state).
    pub fn state(&self, device: &Device<A>) -> Result<ResourceState, InvalidResource> {
        device.texture_state(self)
    }

    /// Overwrite the shared state record without touching the device.
    /// See [`Device::set_texture_state_record`](crate::device::Device::set_texture_state_record).
    pub fn set_state(
        &self,
        device: &Device<A>,
        state: ResourceState,
    ) -> Result<(), InvalidResource> {
        device.set_texture_state_record(self, state)
    }
}

/// The runtime-internal, instantiated counterpart of a handle.
///
/// Created when a handle is first consumed by an internal operation;
/// it attaches to the same arena slot as the handle, so state identity
/// between the two is structural rather than maintained.
#[derive(Debug)]
pub struct Texture<A: hal::Api> {
    pub(crate) id: TextureId,
    pub(crate) raw: A::TextureHandle,
}

impl<A: hal::Api> Texture<A> {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn raw(&self) -> A::TextureHandle {
        self.raw
    }

    pub fn current_layout(&self, device: &Device<A>) -> Result<ImageLayout, InvalidResource> {
        device.texture_state_by_id(self.id).map(|state| state.layout)
    }

    pub fn current_queue_owner(&self, device: &Device<A>) -> Result<QueueOwner, InvalidResource> {
        device.texture_state_by_id(self.id).map(|state| state.owner)
    }

    /// Bookkeeping-only layout update from the internal side, for
    /// subsystems that transition the resource as a side effect of
    /// their own commands (mip regeneration, implicit copies) and must
    /// inform the shared record.
    pub fn update_layout(
        &self,
        device: &Device<A>,
        layout: ImageLayout,
    ) -> Result<(), InvalidResource> {
        device.update_texture_record(self.id, |state| state.layout = layout)
    }

    /// Bookkeeping-only ownership update, mirroring [`Self::update_layout`].
    pub fn set_queue_owner(
        &self,
        device: &Device<A>,
        owner: QueueOwner,
    ) -> Result<(), InvalidResource> {
        device.update_texture_record(self.id, |state| state.owner = owner)
    }
}
