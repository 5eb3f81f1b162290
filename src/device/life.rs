/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::{
    hal::{self, Device as _},
    id::TextureId,
    SubmissionIndex,
};

use smallvec::SmallVec;

/// Natives whose destruction waits on one submission's retirement.
#[derive(Debug)]
struct ActiveSubmission<A: hal::Api> {
    index: SubmissionIndex,
    /// `None` raw means the runtime never owned native destruction for
    /// this texture; only the tracking slot gets reclaimed.
    free_textures: SmallVec<[(TextureId, Option<A::TextureHandle>); 2]>,
}

/// A deferred-deletion queue keyed by submission retirement.
///
/// Destruction requests arrive with the index of the last submission
/// that references the resource; the native object is freed only once
/// the device confirms that index complete. Entries are kept in FIFO
/// order, oldest submission first.
#[derive(Debug)]
pub(super) struct LifetimeTracker<A: hal::Api> {
    active: Vec<ActiveSubmission<A>>,
}

impl<A: hal::Api> LifetimeTracker<A> {
    pub(super) fn new() -> Self {
        Self { active: Vec::new() }
    }

    pub(super) fn schedule_destroy(
        &mut self,
        id: TextureId,
        raw: Option<A::TextureHandle>,
        last_use: SubmissionIndex,
    ) {
        log::trace!(
            "texture {:?} parked until submission {} retires",
            id,
            last_use
        );
        match self.active.iter_mut().find(|a| a.index == last_use) {
            Some(active) => active.free_textures.push((id, raw)),
            None => {
                let mut free_textures = SmallVec::new();
                free_textures.push((id, raw));
                self.active.push(ActiveSubmission {
                    index: last_use,
                    free_textures,
                });
                self.active.sort_by_key(|a| a.index);
            }
        }
    }

    /// Free everything whose submission has retired. Returns the ids
    /// whose arena slots can now be reclaimed.
    pub(super) fn triage(
        &mut self,
        last_done: SubmissionIndex,
        device: &A::Device,
    ) -> SmallVec<[TextureId; 2]> {
        let mut reclaimed = SmallVec::new();
        let retired_count = self
            .active
            .iter()
            .take_while(|a| a.index <= last_done)
            .count();
        for active in self.active.drain(..retired_count) {
            for (id, raw) in active.free_textures {
                if let Some(raw) = raw {
                    log::debug!("texture {:?} native object destroyed", id);
                    unsafe { device.destroy_texture(raw) };
                }
                reclaimed.push(id);
            }
        }
        reclaimed
    }

    /// The submission index the most patient parked resource waits on,
    /// if any.
    pub(super) fn lowest_active_submission(&self) -> Option<SubmissionIndex> {
        self.active.first().map(|a| a.index)
    }
}
