//! Coordinator state machine
//!
//! ```text
//! Idle -> Fetching -> Transforming <-> Delivering -> Committing -> Idle
//! any active state -> Backoff -> Idle
//! any state -> Halted (terminal)
//! ```
//!
//! Transitions are explicit; anything not listed is an internal error.

use super::errors::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Fetching,
    Transforming,
    Delivering,
    Committing,
    Backoff,
    Halted,
}

impl CoordinatorState {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Fetching => "Fetching",
            Self::Transforming => "Transforming",
            Self::Delivering => "Delivering",
            Self::Committing => "Committing",
            Self::Backoff => "Backoff",
            Self::Halted => "Halted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted)
    }

    pub fn can_transition(&self, to: CoordinatorState) -> bool {
        use CoordinatorState::*;
        match (*self, to) {
            (Halted, _) => false,
            (_, Halted) => true,

            (Idle, Fetching) | (Idle, Backoff) => true,

            // empty batch, shutdown, batch of skipped rows only
            (Fetching, Idle) | (Fetching, Transforming) | (Fetching, Committing) => true,

            // a skipped record moves straight to the next one
            (Transforming, Transforming) | (Transforming, Delivering) => true,
            (Transforming, Committing) | (Transforming, Idle) => true,

            (Delivering, Transforming) | (Delivering, Committing) | (Delivering, Idle) => true,

            (Committing, Idle) => true,

            (Fetching, Backoff) | (Transforming, Backoff) | (Delivering, Backoff) => true,
            (Backoff, Idle) => true,

            _ => false,
        }
    }

    /// Move to `to`, or fail with `IllegalTransition`
    pub fn transition(self, to: CoordinatorState) -> SyncResult<CoordinatorState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(SyncError::IllegalTransition {
                from: self.state_name(),
                to: to.state_name(),
            })
        }
    }
}
