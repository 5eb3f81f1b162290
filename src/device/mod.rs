/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! The per-context device object.
 *
 *  One `Device` is one device context: it owns the texture arena (and
 *  with it every state record), the pending per-family command streams,
 *  the binding cache and the deferred-deletion queue. All state
 *  mutation and command recording for a context happen on one logical
 *  thread of control; the internal locks exist so the API can take
 *  `&self` and so independent contexts never cross-contaminate.
 */

mod life;

use crate::{
    binding::BindingCache,
    hal::{self, CommandEncoder as _, Device as _, Queue as _},
    id::{markers, TextureId},
    resource::{
        BackendTexture, CreateTextureError, InvalidResource, Texture, TextureDescriptor,
        TextureSlot,
    },
    state::ResourceState,
    storage::Storage,
    track::{self, Action},
    FastHashMap, LifeGuard, SubmissionIndex, TransitionError,
};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use thiserror::Error;

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DestroyError {
    #[error("texture is invalid or has already been destroyed")]
    Invalid,
    #[error("texture has unretired work in flight; submit and wait before handing it off")]
    SynchronizationRequired,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum SetStateError {
    #[error(transparent)]
    InvalidResource(#[from] InvalidResource),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct Device<A: hal::Api> {
    raw: A::Device,
    queue: Mutex<A::Queue>,
    /// The queue family this device records on when no other family is
    /// involved in a transition.
    family: u32,
    textures: RwLock<Storage<TextureSlot<A>, markers::Texture>>,
    /// Command streams with recorded but unsubmitted transition
    /// commands, one per involved queue family.
    pending_encoders: Mutex<FastHashMap<u32, A::CommandEncoder>>,
    bindings: Mutex<BindingCache<A>>,
    life_tracker: Mutex<life::LifetimeTracker<A>>,
    /// Index of the last submission handed to the queue. Work recorded
    /// now belongs to submission `last_submission + 1`.
    last_submission: AtomicU64,
}

impl<A: hal::Api> Device<A> {
    pub fn new(raw: A::Device, queue: A::Queue, family: u32) -> Self {
        let unit_count = raw.texture_unit_count();
        Self {
            raw,
            queue: Mutex::new(queue),
            family,
            textures: RwLock::new(Storage::new("Texture")),
            pending_encoders: Mutex::new(FastHashMap::default()),
            bindings: Mutex::new(BindingCache::new(unit_count)),
            life_tracker: Mutex::new(life::LifetimeTracker::new()),
            last_submission: AtomicU64::new(0),
        }
    }

    /// The underlying backend device, for interop. Any raw driver work
    /// done through this must be followed by
    /// [`reset_texture_bindings`](Self::reset_texture_bindings) if it
    /// may have touched binding slots.
    pub fn hal_device(&self) -> &A::Device {
        &self.raw
    }

    pub fn queue_family(&self) -> u32 {
        self.family
    }

    fn pending_index(&self) -> SubmissionIndex {
        self.last_submission.load(Ordering::Acquire) + 1
    }

    /// Allocate a texture and start tracking it.
    ///
    /// The state record is seeded with the backend-reported state of
    /// the fresh allocation.
    pub fn create_texture(
        &self,
        desc: &TextureDescriptor,
    ) -> Result<BackendTexture<A>, CreateTextureError> {
        profiling::scope!("Device::create_texture");

        if desc.width == 0 || desc.height == 0 {
            return Err(CreateTextureError::ZeroDimension {
                width: desc.width,
                height: desc.height,
            });
        }
        if desc.usage.is_empty() {
            return Err(CreateTextureError::EmptyUsage);
        }
        let maximum = desc.max_mip_level_count();
        if desc.mip_level_count == 0 || desc.mip_level_count > maximum {
            return Err(CreateTextureError::InvalidMipLevelCount {
                requested: desc.mip_level_count,
                maximum,
            });
        }

        let (raw, state) = self.raw.create_texture(desc)?;
        let slot = TextureSlot {
            raw: Some(raw),
            state,
            trusted: true,
            owned: true,
            life_guard: LifeGuard::new(),
            label: desc.label.unwrap_or_default().to_string(),
        };
        let id = self.textures.write().insert(slot);
        log::trace!(
            "texture {:?} created as {:?}, seeded with {:?}",
            id,
            raw,
            state
        );
        Ok(BackendTexture {
            id,
            raw,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        })
    }

    /// Adopt an externally created texture.
    ///
    /// `initial` pins a trusted seed for the state record. Passing
    /// `None` seeds an unknown state: the first executed transition
    /// will then plan from an undefined layout rather than trusting the
    /// record. The native object is destroyed on deletion only with
    /// `take_ownership`.
    pub fn wrap_texture(
        &self,
        raw: A::TextureHandle,
        desc: &TextureDescriptor,
        initial: Option<ResourceState>,
        take_ownership: bool,
    ) -> BackendTexture<A> {
        let slot = TextureSlot {
            raw: Some(raw),
            state: initial.unwrap_or(ResourceState::UNKNOWN),
            trusted: initial.is_some(),
            owned: take_ownership,
            life_guard: LifeGuard::new(),
            label: desc.label.unwrap_or_default().to_string(),
        };
        let id = self.textures.write().insert(slot);
        log::trace!(
            "texture {:?} wrapped around {:?}, initial state {:?} ({})",
            id,
            raw,
            initial,
            if initial.is_some() {
                "trusted"
            } else {
                "unknown"
            }
        );
        BackendTexture {
            id,
            raw,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        }
    }

    /// True iff the handle references a live allocation in this
    /// context.
    pub fn is_texture_valid(&self, texture: &BackendTexture<A>) -> bool {
        self.textures.read().contains(texture.id)
    }

    /// Read the shared state record through a handle.
    pub fn texture_state(
        &self,
        texture: &BackendTexture<A>,
    ) -> Result<ResourceState, InvalidResource> {
        self.texture_state_by_id(texture.id)
    }

    pub(crate) fn texture_state_by_id(
        &self,
        id: TextureId,
    ) -> Result<ResourceState, InvalidResource> {
        self.textures
            .read()
            .get(id)
            .map(|slot| slot.state)
            .map_err(|_| InvalidResource)
    }

    /// Overwrite the shared state record, with zero device side
    /// effects.
    ///
    /// This is a bookkeeping correction ("we know the resource is
    /// already in this state"), as distinct from an executed transition
    /// via [`set_texture_state`](Self::set_texture_state). Claiming a
    /// state that does not match device reality is a caller contract
    /// violation this layer cannot detect.
    pub fn set_texture_state_record(
        &self,
        texture: &BackendTexture<A>,
        state: ResourceState,
    ) -> Result<(), InvalidResource> {
        self.update_texture_record(texture.id, |record| *record = state)
    }

    pub(crate) fn update_texture_record(
        &self,
        id: TextureId,
        update: impl FnOnce(&mut ResourceState),
    ) -> Result<(), InvalidResource> {
        let mut guard = self.textures.write();
        let slot = guard.get_mut(id).map_err(|_| InvalidResource)?;
        update(&mut slot.state);
        // The caller vouches for the new value, which makes the record
        // as trustworthy as a pinned wrap.
        slot.trusted = true;
        log::trace!("texture {:?} record overwritten to {:?}", id, slot.state);
        Ok(())
    }

    /// Instantiate the runtime-internal object for a handle. The
    /// object attaches to the same arena slot, so state mutations made
    /// through either side are observed by both.
    pub fn instantiate_texture(
        &self,
        texture: &BackendTexture<A>,
    ) -> Result<Texture<A>, InvalidResource> {
        let guard = self.textures.read();
        let slot = guard.get(texture.id).map_err(|_| InvalidResource)?;
        Ok(Texture {
            id: texture.id,
            raw: slot.raw.ok_or(InvalidResource)?,
        })
    }

    /// Record the commands that transition a texture to `desired` and
    /// update its record.
    ///
    /// The record is updated as soon as the commands are recorded, so
    /// it reflects intent: the state the resource will be in once the
    /// recorded commands execute. Nothing reaches the device until
    /// [`submit`](Self::submit); callers must submit before relying on
    /// the new state being physically true and before destroying the
    /// resource. Requesting the already-tracked state records nothing.
    pub fn set_texture_state(
        &self,
        texture: &BackendTexture<A>,
        desired: ResourceState,
    ) -> Result<(), SetStateError> {
        profiling::scope!("Device::set_texture_state");

        let mut guard = self.textures.write();
        let slot = guard.get_mut(texture.id).map_err(|_| InvalidResource)?;
        let raw = slot.raw.ok_or(InvalidResource)?;

        let actions = track::plan(slot.state, desired, slot.trusted)?;
        if actions.is_empty() {
            return Ok(());
        }

        let mut encoders = self.pending_encoders.lock();
        for action in actions {
            match action {
                Action::Barrier { stream, layouts } => {
                    let encoder = encoders
                        .entry(stream.unwrap_or(self.family))
                        .or_insert_with(|| self.raw.create_command_encoder());
                    encoder.texture_barrier(hal::TextureBarrier {
                        texture: raw,
                        layouts,
                    });
                }
                Action::Release {
                    stream,
                    layouts,
                    owners,
                } => {
                    let encoder = encoders
                        .entry(stream.unwrap_or(self.family))
                        .or_insert_with(|| self.raw.create_command_encoder());
                    encoder.release_ownership(hal::OwnershipTransfer {
                        texture: raw,
                        layouts,
                        owners,
                    });
                }
                Action::Acquire {
                    stream,
                    layouts,
                    owners,
                } => {
                    let encoder = encoders
                        .entry(stream.unwrap_or(self.family))
                        .or_insert_with(|| self.raw.create_command_encoder());
                    encoder.acquire_ownership(hal::OwnershipTransfer {
                        texture: raw,
                        layouts,
                        owners,
                    });
                }
            }
        }
        drop(encoders);

        slot.life_guard.use_at(self.pending_index());
        log::trace!(
            "texture {:?} transition recorded: {:?} -> {:?}",
            texture.id,
            slot.state,
            desired
        );
        slot.state = desired;
        slot.trusted = true;
        Ok(())
    }

    /// Flush every pending command stream to the device.
    ///
    /// With `wait_for_completion` the call blocks until the submission
    /// retires, which also releases any deferred destructions waiting
    /// on it.
    pub fn submit(&self, wait_for_completion: bool) -> Result<SubmissionIndex, hal::DeviceError> {
        profiling::scope!("Device::submit");

        let encoders: SmallVec<[A::CommandEncoder; 2]> =
            self.pending_encoders.lock().drain().map(|(_, e)| e).collect();
        let index = self
            .queue
            .lock()
            .submit(encoders.into_iter(), wait_for_completion)?;
        self.last_submission.store(index, Ordering::Release);
        log::trace!(
            "submission {} enqueued (wait: {})",
            index,
            wait_for_completion
        );
        self.maintain();
        Ok(index)
    }

    /// Block until the given submission retires, then reclaim whatever
    /// was waiting on it.
    pub fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), hal::DeviceError> {
        self.queue.lock().wait(index)?;
        self.maintain();
        Ok(())
    }

    /// Check the retirement fence and free every native object whose
    /// last use has retired.
    pub fn maintain(&self) {
        let last_done = self.queue.lock().retired();
        let reclaimed = self.life_tracker.lock().triage(last_done, &self.raw);
        if !reclaimed.is_empty() {
            let mut guard = self.textures.write();
            for id in reclaimed {
                if let Ok(slot) = guard.get_occupied_or_destroyed(id) {
                    log::trace!("texture {:?} ({:?}) reclaimed", id, slot.label);
                }
                guard.remove(id);
            }
        }
    }

    /// Release the texture's tracking slot and free the native object.
    ///
    /// If submitted-but-unretired work (or recorded-but-unsubmitted
    /// commands) still reference the texture, the native free is
    /// deferred until the referencing submission retires. Deleting
    /// twice, or using the handle afterwards, is a usage error.
    pub fn delete_texture(&self, texture: &BackendTexture<A>) -> Result<(), DestroyError> {
        profiling::scope!("Device::delete_texture");

        let mut guard = self.textures.write();
        let slot = match guard.mark_destroyed(texture.id) {
            Ok(slot) => slot,
            Err(_) => {
                log::warn!("texture {:?} deleted twice or never valid", texture.id);
                return Err(DestroyError::Invalid);
            }
        };
        log::trace!(
            "texture {:?} ({:?}) marked destroyed",
            texture.id,
            slot.label
        );
        let raw = slot.raw.take().filter(|_| slot.owned);
        let last_use = slot.life_guard.life_count();
        let last_done = self.queue.lock().retired();

        if last_use > last_done {
            self.life_tracker
                .lock()
                .schedule_destroy(texture.id, raw, last_use);
        } else {
            if let Some(raw) = raw {
                log::debug!("texture {:?} native object destroyed", texture.id);
                unsafe { self.raw.destroy_texture(raw) };
            }
            guard.remove(texture.id);
        }
        Ok(())
    }

    /// Hand the native object back to the caller, ending tracking
    /// without destroying it.
    ///
    /// Unlike deletion there is no deferred path here: the caller is
    /// taking the object outside our authority, so every referencing
    /// submission must have retired first.
    pub fn release_texture(
        &self,
        texture: &BackendTexture<A>,
    ) -> Result<A::TextureHandle, DestroyError> {
        let mut guard = self.textures.write();
        let slot = guard.get_mut(texture.id).map_err(|_| DestroyError::Invalid)?;
        if slot.life_guard.life_count() > self.queue.lock().retired() {
            return Err(DestroyError::SynchronizationRequired);
        }
        let raw = slot.raw.take().ok_or(DestroyError::Invalid)?;
        guard.remove(texture.id);
        log::debug!("texture {:?} handed off as {:?}", texture.id, raw);
        Ok(raw)
    }

    /// Forget every binding assumption.
    ///
    /// Call this whenever control returns from a region where raw
    /// driver calls may have rebound texture slots; the next internal
    /// bind per slot is then unconditional.
    pub fn reset_texture_bindings(&self) {
        log::debug!("texture binding cache invalidated");
        self.bindings.lock().invalidate_all();
    }

    /// Bind the texture on (unit, target) unless the cache says it is
    /// already bound there. Returns whether a driver bind was issued.
    ///
    /// Only valid while the invalidation contract of
    /// [`reset_texture_bindings`](Self::reset_texture_bindings) is
    /// honored; a stale cache entry manifests as silently wrong
    /// sampling, not an error.
    pub fn bind_texture_if_needed(
        &self,
        unit: u32,
        target: hal::BindTarget,
        texture: &BackendTexture<A>,
    ) -> Result<bool, InvalidResource> {
        let guard = self.textures.read();
        let slot = guard.get(texture.id).map_err(|_| InvalidResource)?;
        let raw = slot.raw.ok_or(InvalidResource)?;

        let mut bindings = self.bindings.lock();
        if !bindings.needs_bind(unit, target, raw) {
            log::trace!("bind of {:?} on ({}, {:?}) elided", raw, unit, target);
            return Ok(false);
        }
        self.raw.bind_texture(unit, target, Some(raw));
        bindings.assume_bound(unit, target, raw);
        Ok(true)
    }
}

impl<A: hal::Api> Drop for Device<A> {
    fn drop(&mut self) {
        // Whatever retirement allows at this point gets freed; parking
        // the rest would leak, so note it.
        self.maintain();
        let lowest = self.life_tracker.lock().lowest_active_submission();
        if let Some(index) = lowest {
            log::warn!(
                "device dropped with native objects still parked on submission {}",
                index
            );
        }
    }
}
