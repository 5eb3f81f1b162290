/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! Collaborator contracts consumed by the state-coordination core.
 *
 *  The core needs three things from a backend: create/destroy native
 *  resources, record state-transition commands into per-queue command
 *  streams, and submit those streams. Backends are selected at compile
 *  time via the [`Api`] trait; destruction takes raw handles and is
 *  therefore unsafe.
 */

pub mod noop;

use crate::{
    resource::TextureDescriptor,
    state::{ImageLayout, QueueOwner},
    SubmissionIndex,
};

use thiserror::Error;

use std::{fmt, hash::Hash, ops::Range};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DeviceError {
    #[error("not enough memory left")]
    OutOfMemory,
    #[error("device is lost")]
    Lost,
}

/// The backend cannot satisfy a resource creation request.
///
/// These are capacity or capability problems; they do not self-heal, so
/// the core reports them upward without retrying.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AllocationError {
    #[error("not enough memory left")]
    OutOfMemory,
    #[error("format is not supported for the requested usage")]
    UnsupportedFormat,
    #[error("dimension {dim} exceeds the limit of {limit}")]
    TooLarge { dim: u32, limit: u32 },
}

/// The driver-level target kind a texture can be bound to for sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindTarget {
    D2,
    External,
    Rectangle,
}

impl BindTarget {
    pub const COUNT: usize = 3;

    pub(crate) fn index(self) -> usize {
        match self {
            BindTarget::D2 => 0,
            BindTarget::External => 1,
            BindTarget::Rectangle => 2,
        }
    }
}

/// A layout/access barrier on a single queue's command stream.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureBarrier<A: Api> {
    pub texture: A::TextureHandle,
    pub layouts: Range<ImageLayout>,
}

/// One side of a queue-ownership transfer.
///
/// A transfer between two real families needs a release recorded on the
/// source stream and an acquire on the destination stream; a transfer
/// to or from a sentinel owner records only our side of the pair.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnershipTransfer<A: Api> {
    pub texture: A::TextureHandle,
    pub layouts: Range<ImageLayout>,
    pub owners: Range<QueueOwner>,
}

pub trait Api: Clone + Sized + 'static {
    type Device: Device<Self>;
    type Queue: Queue<Self>;
    type CommandEncoder: CommandEncoder<Self>;

    /// The backend-native identity token for a texture.
    type TextureHandle: fmt::Debug + Copy + Eq + Hash + Send + Sync + 'static;
}

pub trait Device<A: Api> {
    /// Allocate a native texture, reporting the state the fresh
    /// allocation is in.
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
    ) -> Result<(A::TextureHandle, crate::state::ResourceState), AllocationError>;

    /// Free a native texture.
    ///
    /// # Safety
    ///
    /// No GPU work referencing the texture may still be in flight, and
    /// the handle must not be used afterwards. The core enforces this
    /// through its deferred-deletion queue.
    unsafe fn destroy_texture(&self, texture: A::TextureHandle);

    fn create_command_encoder(&self) -> A::CommandEncoder;

    /// Bind or unbind a texture on a sampler slot. This is immediate
    /// driver state, not a recorded command.
    fn bind_texture(&self, unit: u32, target: BindTarget, texture: Option<A::TextureHandle>);

    /// How many sampler units the driver exposes.
    fn texture_unit_count(&self) -> u32;
}

pub trait CommandEncoder<A: Api> {
    fn texture_barrier(&mut self, barrier: TextureBarrier<A>);
    fn release_ownership(&mut self, transfer: OwnershipTransfer<A>);
    fn acquire_ownership(&mut self, transfer: OwnershipTransfer<A>);
}

pub trait Queue<A: Api> {
    /// Enqueue the recorded command streams to the device.
    ///
    /// Streams from different queue families are ordered so that every
    /// release is observed before the matching acquire (the boundary
    /// carries the semaphore). Returns the submission's index; with
    /// `wait_for_completion` the call blocks until that index retires.
    fn submit<I: Iterator<Item = A::CommandEncoder>>(
        &mut self,
        command_buffers: I,
        wait_for_completion: bool,
    ) -> Result<SubmissionIndex, DeviceError>;

    /// The highest submission index the device has confirmed complete.
    fn retired(&self) -> SubmissionIndex;

    /// Block until the given submission index retires.
    fn wait(&mut self, index: SubmissionIndex) -> Result<(), DeviceError>;
}
