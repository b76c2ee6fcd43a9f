//! Pure bounded-retry state machine for the generation loop.
//!
//! The controller in [`crate::run`] owns the stage side effects; every
//! transition between stages goes through [`advance`] so the retry budget and
//! the fatal/recoverable split stay auditable in one place, independent of
//! any backend.

use std::fmt;

/// States of one run. `Succeeded` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Planning,
    Generating,
    Executing,
    Deciding,
    Succeeded,
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Succeeded | LoopState::Exhausted)
    }
}

/// Stage outcomes that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Planned,
    Generated,
    GenerationFailed,
    Produced,
    ExecutionFailed,
    Matched,
    Mismatched,
}

impl LoopEvent {
    /// Recoverable failures consume one unit of the attempt budget.
    pub fn consumes_attempt(self) -> bool {
        matches!(
            self,
            LoopEvent::GenerationFailed | LoopEvent::ExecutionFailed | LoopEvent::Mismatched
        )
    }
}

/// An event was fed to a state that has no transition for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub state: LoopState,
    pub event: LoopEvent,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal transition: event {:?} in state {:?}",
            self.event, self.state
        )
    }
}

impl std::error::Error for TransitionError {}

/// Advance the machine by one event.
///
/// `attempts_recorded` is the number of attempts appended so far, including
/// the attempt a failure event has just recorded; a recoverable failure
/// re-enters `Planning` while `attempts_recorded < max_attempts` and lands in
/// `Exhausted` otherwise.
pub fn advance(
    state: LoopState,
    event: LoopEvent,
    attempts_recorded: u32,
    max_attempts: u32,
) -> Result<LoopState, TransitionError> {
    let next = match (state, event) {
        (LoopState::Planning, LoopEvent::Planned) => LoopState::Generating,
        (LoopState::Generating, LoopEvent::Generated) => LoopState::Executing,
        (LoopState::Generating, LoopEvent::GenerationFailed) => {
            retry_or_exhausted(attempts_recorded, max_attempts)
        }
        (LoopState::Executing, LoopEvent::Produced) => LoopState::Deciding,
        (LoopState::Executing, LoopEvent::ExecutionFailed) => {
            retry_or_exhausted(attempts_recorded, max_attempts)
        }
        (LoopState::Deciding, LoopEvent::Matched) => LoopState::Succeeded,
        (LoopState::Deciding, LoopEvent::Mismatched) => {
            retry_or_exhausted(attempts_recorded, max_attempts)
        }
        (state, event) => return Err(TransitionError { state, event }),
    };
    Ok(next)
}

fn retry_or_exhausted(attempts_recorded: u32, max_attempts: u32) -> LoopState {
    if attempts_recorded < max_attempts {
        LoopState::Planning
    } else {
        LoopState::Exhausted
    }
}
