/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Transition planning.
//!
//! Given the tracked state of a resource and a desired new state, decide
//! which commands have to be recorded, and on which queue family's
//! command stream. The planner is pure: it touches no encoder and no
//! record, so a rejected transition has no partial side effects.

use crate::state::{ImageLayout, QueueOwner, ResourceState};

use arrayvec::ArrayVec;
use thiserror::Error;

use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum TransitionError {
    #[error("cannot transition a texture into an undefined layout")]
    UndefinedDestination,
    #[error("ownership transfer from {from:?} to {to:?} is outside the command stream authority on both sides")]
    ForeignHandoff { from: QueueOwner, to: QueueOwner },
}

/// One command the executor has to record for a transition.
///
/// `stream` names the queue family whose command stream receives the
/// command; `None` means the device's own default family.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Action {
    Barrier {
        stream: Option<u32>,
        layouts: Range<ImageLayout>,
    },
    Release {
        stream: Option<u32>,
        layouts: Range<ImageLayout>,
        owners: Range<QueueOwner>,
    },
    Acquire {
        stream: Option<u32>,
        layouts: Range<ImageLayout>,
        owners: Range<QueueOwner>,
    },
}

/// A transition needs at most a release and an acquire.
pub(crate) type Plan = ArrayVec<Action, 2>;

/// Classify the transition from `current` to `desired`.
///
/// An untrusted current state (a wrap that did not pin its seed) plans
/// from an `Undefined` starting layout, so the full barrier is emitted
/// no matter what the record claims.
pub(crate) fn plan(
    current: ResourceState,
    desired: ResourceState,
    trusted: bool,
) -> Result<Plan, TransitionError> {
    let mut actions = Plan::new();
    if current == desired && trusted {
        return Ok(actions);
    }
    if desired.layout == ImageLayout::Undefined {
        return Err(TransitionError::UndefinedDestination);
    }

    let start_layout = if trusted {
        current.layout
    } else {
        ImageLayout::Undefined
    };
    let layouts = start_layout..desired.layout;

    let transfer_needed = current.owner != desired.owner
        && current.owner != QueueOwner::Ignored
        && desired.owner != QueueOwner::Ignored;

    if !transfer_needed {
        // Same owner, or ownership untracked on one side: a pure
        // layout/access barrier, recorded on whichever real family is
        // involved.
        let stream = desired.owner.family().or_else(|| current.owner.family());
        actions.push(Action::Barrier { stream, layouts });
        return Ok(actions);
    }

    let owners = current.owner..desired.owner;
    match (current.owner.family(), desired.owner.family()) {
        (Some(src), Some(_dst)) => {
            actions.push(Action::Release {
                stream: Some(src),
                layouts: layouts.clone(),
                owners: owners.clone(),
            });
            actions.push(Action::Acquire {
                stream: desired.owner.family(),
                layouts,
                owners,
            });
        }
        (Some(src), None) => {
            // Handing off to an external/foreign owner: only our side
            // of the pair can be recorded.
            actions.push(Action::Release {
                stream: Some(src),
                layouts,
                owners,
            });
        }
        (None, Some(dst)) => {
            actions.push(Action::Acquire {
                stream: Some(dst),
                layouts,
                owners,
            });
        }
        (None, None) => {
            return Err(TransitionError::ForeignHandoff {
                from: current.owner,
                to: desired.owner,
            });
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLED: ImageLayout = ImageLayout::ShaderReadOnlyOptimal;
    const GENERAL: ImageLayout = ImageLayout::General;

    fn state(layout: ImageLayout, owner: QueueOwner) -> ResourceState {
        ResourceState::new(layout, owner)
    }

    #[test]
    fn idempotent_is_empty() {
        let s = state(SAMPLED, QueueOwner::Family(0));
        assert_eq!(plan(s, s, true).unwrap().len(), 0);
    }

    #[test]
    fn same_owner_is_pure_barrier() {
        let plan = plan(
            state(GENERAL, QueueOwner::Family(2)),
            state(SAMPLED, QueueOwner::Family(2)),
            true,
        )
        .unwrap();
        assert_eq!(
            plan.as_slice(),
            &[Action::Barrier {
                stream: Some(2),
                layouts: GENERAL..SAMPLED,
            }]
        );
    }

    #[test]
    fn ignored_owner_never_transfers() {
        let plan = plan(
            state(GENERAL, QueueOwner::Family(1)),
            state(SAMPLED, QueueOwner::Ignored),
            true,
        )
        .unwrap();
        assert_eq!(
            plan.as_slice(),
            &[Action::Barrier {
                stream: Some(1),
                layouts: GENERAL..SAMPLED,
            }]
        );
    }

    #[test]
    fn cross_family_is_release_then_acquire() {
        let owners = QueueOwner::Family(0)..QueueOwner::Family(1);
        let plan = plan(
            state(GENERAL, QueueOwner::Family(0)),
            state(GENERAL, QueueOwner::Family(1)),
            true,
        )
        .unwrap();
        assert_eq!(
            plan.as_slice(),
            &[
                Action::Release {
                    stream: Some(0),
                    layouts: GENERAL..GENERAL,
                    owners: owners.clone(),
                },
                Action::Acquire {
                    stream: Some(1),
                    layouts: GENERAL..GENERAL,
                    owners,
                },
            ]
        );
    }

    #[test]
    fn external_handoff_is_one_sided() {
        let release = plan(
            state(GENERAL, QueueOwner::Family(0)),
            state(GENERAL, QueueOwner::External),
            true,
        )
        .unwrap();
        assert!(matches!(release.as_slice(), [Action::Release { .. }]));

        let acquire = plan(
            state(GENERAL, QueueOwner::External),
            state(GENERAL, QueueOwner::Family(0)),
            true,
        )
        .unwrap();
        assert!(matches!(acquire.as_slice(), [Action::Acquire { .. }]));
    }

    #[test]
    fn sentinel_to_sentinel_is_rejected() {
        let err = plan(
            state(GENERAL, QueueOwner::External),
            state(GENERAL, QueueOwner::Foreign),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::ForeignHandoff { .. }));
    }

    #[test]
    fn undefined_destination_is_rejected() {
        let err = plan(
            state(GENERAL, QueueOwner::Ignored),
            state(ImageLayout::Undefined, QueueOwner::Ignored),
            true,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::UndefinedDestination);
    }

    #[test]
    fn untrusted_state_plans_from_undefined() {
        // The record claims the desired state already, but the wrap was
        // not pinned: a full barrier must still be emitted.
        let s = state(SAMPLED, QueueOwner::Ignored);
        let plan = plan(s, s, false).unwrap();
        assert_eq!(
            plan.as_slice(),
            &[Action::Barrier {
                stream: None,
                layouts: ImageLayout::Undefined..SAMPLED,
            }]
        );
    }
}
