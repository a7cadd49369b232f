use serde::Serialize;

use crate::errors::LoadError;

/// Lifecycle of one partition load.
///
/// ```text
/// Pending -> Loading -> Committed
///    |          |
///    +----------+-> FailedAttempt -> Pending (retry) | Fatal
/// Pending -> Skipped (empty partition)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Pending,
    Loading,
    Committed,
    FailedAttempt,
    Skipped,
    Fatal,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Committed | LoadState::Skipped | LoadState::Fatal)
    }

    pub fn can_transition_to(&self, next: LoadState) -> bool {
        use LoadState::*;
        matches!(
            (self, next),
            (Pending, Loading)
                | (Pending, FailedAttempt)
                | (Pending, Skipped)
                | (Loading, Committed)
                | (Loading, FailedAttempt)
                | (FailedAttempt, Pending)
                | (FailedAttempt, Fatal)
        )
    }
}

/// Current state plus the path that led to it.
#[derive(Debug, Clone)]
pub struct LoadStateMachine {
    current: LoadState,
    history: Vec<LoadState>,
}

impl Default for LoadStateMachine {
    fn default() -> Self {
        Self {
            current: LoadState::Pending,
            history: vec![LoadState::Pending],
        }
    }
}

impl LoadStateMachine {
    pub fn current(&self) -> LoadState {
        self.current
    }

    pub fn history(&self) -> &[LoadState] {
        &self.history
    }

    pub fn transition(&mut self, next: LoadState) -> Result<(), LoadError> {
        if !self.current.can_transition_to(next) {
            return Err(LoadError::IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}
