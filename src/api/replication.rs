//! SnapMirror transition guard
//!
//! Both backends read the relationship first and ask [`plan`] whether the
//! requested transition should be issued, is already satisfied, or is not
//! allowed from the current state.

use crate::api::types::{SnapmirrorRelationship, SnapmirrorState, SnapmirrorStatus};
use crate::error::{Error, Result};
use std::fmt;

/// State-changing SnapMirror operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Initialize,
    Resync,
    Quiesce,
    Abort,
    Break,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Initialize => write!(f, "initialize"),
            Transition::Resync => write!(f, "resync"),
            Transition::Quiesce => write!(f, "quiesce"),
            Transition::Abort => write!(f, "abort"),
            Transition::Break => write!(f, "break"),
        }
    }
}

/// Outcome of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Issue the transition
    Issue,
    /// Relationship is already where the transition would take it
    AlreadySatisfied,
}

/// Decide what to do with `transition` given the current relationship
pub fn plan(transition: Transition, relationship: &SnapmirrorRelationship) -> Result<Plan> {
    use SnapmirrorState as S;
    use SnapmirrorStatus as St;

    let state = relationship.state;
    let status = relationship.status;

    let decision = match transition {
        Transition::Initialize => match state {
            S::Uninitialized if status == St::Idle => Some(Plan::Issue),
            // An initial transfer is already running
            S::Uninitialized if status.is_transferring() => Some(Plan::AlreadySatisfied),
            S::Snapmirrored | S::InSync | S::OutOfSync | S::Paused => Some(Plan::AlreadySatisfied),
            _ => None,
        },
        Transition::Resync => match state {
            S::BrokenOff | S::OutOfSync => Some(Plan::Issue),
            S::Snapmirrored | S::InSync | S::Paused => Some(Plan::AlreadySatisfied),
            _ => None,
        },
        Transition::Quiesce => match (state, status) {
            (_, St::Quiesced) | (S::Paused, _) => Some(Plan::AlreadySatisfied),
            (S::Uninitialized | S::BrokenOff | S::Unknown, _) => None,
            _ => Some(Plan::Issue),
        },
        Transition::Abort => match status {
            St::Idle | St::Quiesced | St::Aborting => Some(Plan::AlreadySatisfied),
            St::Transferring | St::Quiescing | St::Finalizing | St::Breaking => Some(Plan::Issue),
            St::Unknown => None,
        },
        Transition::Break => match (state, status) {
            (S::BrokenOff, _) => Some(Plan::AlreadySatisfied),
            (S::Uninitialized | S::Unknown, _) => None,
            (_, St::Idle | St::Quiesced) => Some(Plan::Issue),
            _ => None,
        },
    };

    decision.ok_or_else(|| Error::InvalidTransition {
        relationship: format!("{} -> {}", relationship.source, relationship.destination),
        transition: transition.to_string(),
        state: format!("{}/{:?}", state, status).to_lowercase(),
    })
}
