/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*! Coordination of externally visible GPU resource state.
 *
 *  A texture's memory layout and queue ownership are shared knowledge
 *  between user-held handles, the runtime's internal objects, and the
 *  driver. This library keeps all three views consistent: one mutable
 *  state record per physical resource, addressed by a stable id, with
 *  explicit record-then-submit transitions and a binding cache that can
 *  be invalidated when raw driver access happens behind our back.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    // We don't match on a reference, unless required.
    clippy::pattern_type_mismatch
)]

pub mod binding;
pub mod device;
pub mod hal;
pub mod id;
pub mod resource;
pub mod state;
mod storage;
mod track;

use std::sync::atomic::{AtomicU64, Ordering};

pub use track::TransitionError;

/// The index of a queue submission.
///
/// Submissions are fenced and numbered sequentially, so once the device
/// reports an index as retired, all work submitted at that index or any
/// lower one is known to be complete.
pub type SubmissionIndex = u64;

type Index = u32;
type Epoch = u32;

/// Fast hash map used internally.
type FastHashMap<K, V> =
    std::collections::HashMap<K, V, std::hash::BuildHasherDefault<fxhash::FxHasher>>;

/// Information needed to decide when it's safe to free a native resource.
///
/// Every arena slot carries a `LifeGuard` recording the last submission
/// the resource was used in. Destruction of the native object must wait
/// until that submission retires.
#[derive(Debug)]
pub(crate) struct LifeGuard {
    /// The index of the last queue submission in which the resource
    /// was used, or 0 if it was never recorded into a command stream.
    submission_index: AtomicU64,
}

impl LifeGuard {
    pub(crate) fn new() -> Self {
        Self {
            submission_index: AtomicU64::new(0),
        }
    }

    /// Record that this resource will be used by the queue submission
    /// with the given index.
    pub(crate) fn use_at(&self, submit_index: SubmissionIndex) {
        self.submission_index.store(submit_index, Ordering::Release);
    }

    pub(crate) fn life_count(&self) -> SubmissionIndex {
        self.submission_index.load(Ordering::Acquire)
    }
}
