/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A software backend that models driver truth.
//!
//! Recorded commands only touch the driver-side table when they are
//! submitted, and the retirement counter lags submission unless waited
//! on, so the gap between the tracked belief and the device-true state
//! is observable. The inspection methods exist for tests that must
//! probe actual driver state rather than the runtime's bookkeeping.

use crate::{
    hal::{AllocationError, BindTarget, DeviceError, OwnershipTransfer, TextureBarrier},
    resource::{TextureDescriptor, TextureFormat, TextureUsage},
    state::{ImageLayout, QueueOwner, ResourceState},
    FastHashMap, SubmissionIndex,
};

use parking_lot::Mutex;

use std::{ops::Range, sync::Arc};

pub const MAX_DIMENSION: u32 = 8192;
pub const TEXTURE_UNITS: u32 = 8;

#[derive(Clone, Debug)]
pub struct Api;

impl crate::hal::Api for Api {
    type Device = Device;
    type Queue = Queue;
    type CommandEncoder = Encoder;
    type TextureHandle = u32;
}

#[derive(Debug)]
enum Command {
    Barrier {
        texture: u32,
        layouts: Range<ImageLayout>,
    },
    Release {
        texture: u32,
        layouts: Range<ImageLayout>,
        owners: Range<QueueOwner>,
    },
    Acquire {
        texture: u32,
        layouts: Range<ImageLayout>,
        owners: Range<QueueOwner>,
    },
}

#[derive(Debug, Default)]
struct DriverTable {
    next_id: u32,
    states: FastHashMap<u32, ResourceState>,
    bindings: FastHashMap<(u32, BindTarget), u32>,
    fail_next_create: bool,
}

impl DriverTable {
    fn execute(&mut self, command: Command) {
        match command {
            Command::Barrier { texture, layouts } => {
                let state = self
                    .states
                    .get_mut(&texture)
                    .expect("barrier on a destroyed texture");
                debug_assert!(
                    state.layout == layouts.start || layouts.start == ImageLayout::Undefined,
                    "barrier source layout {:?} does not match device layout {:?}",
                    layouts.start,
                    state.layout
                );
                state.layout = layouts.end;
            }
            Command::Release {
                texture,
                layouts,
                owners,
            } => {
                let state = self
                    .states
                    .get_mut(&texture)
                    .expect("release on a destroyed texture");
                state.layout = layouts.end;
                state.owner = owners.end;
            }
            Command::Acquire {
                texture,
                layouts,
                owners,
            } => {
                let state = self
                    .states
                    .get_mut(&texture)
                    .expect("acquire on a destroyed texture");
                state.layout = layouts.end;
                state.owner = owners.end;
            }
        }
    }
}

/// A command stream under construction. Nothing here reaches the
/// driver table until the encoder is submitted.
#[derive(Debug, Default)]
pub struct Encoder {
    commands: Vec<Command>,
}

impl crate::hal::CommandEncoder<Api> for Encoder {
    fn texture_barrier(&mut self, barrier: TextureBarrier<Api>) {
        self.commands.push(Command::Barrier {
            texture: barrier.texture,
            layouts: barrier.layouts,
        });
    }

    fn release_ownership(&mut self, transfer: OwnershipTransfer<Api>) {
        self.commands.push(Command::Release {
            texture: transfer.texture,
            layouts: transfer.layouts,
            owners: transfer.owners,
        });
    }

    fn acquire_ownership(&mut self, transfer: OwnershipTransfer<Api>) {
        self.commands.push(Command::Acquire {
            texture: transfer.texture,
            layouts: transfer.layouts,
            owners: transfer.owners,
        });
    }
}

#[derive(Debug)]
pub struct Device {
    shared: Arc<Mutex<DriverTable>>,
}

#[derive(Debug)]
pub struct Queue {
    shared: Arc<Mutex<DriverTable>>,
    last_submitted: SubmissionIndex,
    last_retired: SubmissionIndex,
}

/// Open a fresh software device/queue pair.
pub fn create() -> (Device, Queue) {
    let shared = Arc::new(Mutex::new(DriverTable::default()));
    (
        Device {
            shared: Arc::clone(&shared),
        },
        Queue {
            shared,
            last_submitted: 0,
            last_retired: 0,
        },
    )
}

impl Device {
    /// Make the next allocation fail with `OutOfMemory`.
    pub fn fail_next_allocation(&self) {
        self.shared.lock().fail_next_create = true;
    }

    /// The device-true state of a texture, or `None` if it is not
    /// alive.
    pub fn driver_state(&self, texture: u32) -> Option<ResourceState> {
        self.shared.lock().states.get(&texture).copied()
    }

    pub fn is_alive(&self, texture: u32) -> bool {
        self.shared.lock().states.contains_key(&texture)
    }

    /// The driver-reported binding for a slot.
    pub fn bound_texture(&self, unit: u32, target: BindTarget) -> Option<u32> {
        self.shared.lock().bindings.get(&(unit, target)).copied()
    }

    /// Register a texture that was created behind the runtime's back,
    /// as interop code would. Returns the native handle.
    pub fn register_external_texture(&self, state: ResourceState) -> u32 {
        let mut table = self.shared.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.states.insert(id, state);
        id
    }

    /// Bind directly, bypassing any cache above — models raw driver
    /// calls made outside the runtime's control.
    pub fn bind_texture_raw(&self, unit: u32, target: BindTarget, texture: Option<u32>) {
        let mut table = self.shared.lock();
        match texture {
            Some(id) => {
                table.bindings.insert((unit, target), id);
            }
            None => {
                table.bindings.remove(&(unit, target));
            }
        }
    }
}

impl crate::hal::Device<Api> for Device {
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
    ) -> Result<(u32, ResourceState), AllocationError> {
        let mut table = self.shared.lock();
        if table.fail_next_create {
            table.fail_next_create = false;
            return Err(AllocationError::OutOfMemory);
        }
        let dim = desc.width.max(desc.height);
        if dim > MAX_DIMENSION {
            return Err(AllocationError::TooLarge {
                dim,
                limit: MAX_DIMENSION,
            });
        }
        if desc.format == TextureFormat::R8Unorm && desc.usage.contains(TextureUsage::COLOR_TARGET)
        {
            return Err(AllocationError::UnsupportedFormat);
        }
        table.next_id += 1;
        let id = table.next_id;
        // Fresh allocations come back with undefined contents and no
        // tracked owner, like a newly created Vulkan image.
        let state = ResourceState::new(ImageLayout::Undefined, QueueOwner::Ignored);
        table.states.insert(id, state);
        Ok((id, state))
    }

    unsafe fn destroy_texture(&self, texture: u32) {
        let mut table = self.shared.lock();
        table.states.remove(&texture);
        // Deleting a texture unbinds it from every slot it occupied.
        table.bindings.retain(|_, bound| *bound != texture);
    }

    fn create_command_encoder(&self) -> Encoder {
        Encoder::default()
    }

    fn bind_texture(&self, unit: u32, target: BindTarget, texture: Option<u32>) {
        self.bind_texture_raw(unit, target, texture);
    }

    fn texture_unit_count(&self) -> u32 {
        TEXTURE_UNITS
    }
}

impl crate::hal::Queue<Api> for Queue {
    fn submit<I: Iterator<Item = Encoder>>(
        &mut self,
        command_buffers: I,
        wait_for_completion: bool,
    ) -> Result<SubmissionIndex, DeviceError> {
        let mut table = self.shared.lock();
        for encoder in command_buffers {
            for command in encoder.commands {
                table.execute(command);
            }
        }
        self.last_submitted += 1;
        if wait_for_completion {
            self.last_retired = self.last_submitted;
        }
        Ok(self.last_submitted)
    }

    fn retired(&self) -> SubmissionIndex {
        self.last_retired
    }

    fn wait(&mut self, index: SubmissionIndex) -> Result<(), DeviceError> {
        if index > self.last_submitted {
            return Err(DeviceError::Lost);
        }
        if index > self.last_retired {
            self.last_retired = index;
        }
        Ok(())
    }
}
