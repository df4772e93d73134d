use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::common::errors::EngineError;

/// Lifecycle of the orchestrator.
///
/// `Idle → Scanning → Scanned → Cleaning → {Completed | Cancelled | Failed}`.
/// Terminal states stay observable until the next operation starts, which
/// then behaves as if the engine were `Idle`. `Restoring` and `Purging` are
/// maintenance detours that return to whatever state they started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Scanning,
    Scanned,
    Cleaning,
    Restoring,
    Purging,
    Completed,
    Cancelled,
    Failed,
}

impl EngineState {
    /// Active operations are mutually exclusive with everything else
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            EngineState::Scanning
                | EngineState::Cleaning
                | EngineState::Restoring
                | EngineState::Purging
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Completed | EngineState::Cancelled | EngineState::Failed
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Scanning => "scanning",
            EngineState::Scanned => "scanned",
            EngineState::Cleaning => "cleaning",
            EngineState::Restoring => "restoring",
            EngineState::Purging => "purging",
            EngineState::Completed => "completed",
            EngineState::Cancelled => "cancelled",
            EngineState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of a run that may have been cut short. Cancellation is not an
/// error: the partial aggregate is handed back either way.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    Cancelled(T),
}

impl<T> RunOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }

    pub fn value(&self) -> &T {
        match self {
            RunOutcome::Completed(v) | RunOutcome::Cancelled(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            RunOutcome::Completed(v) | RunOutcome::Cancelled(v) => v,
        }
    }
}

/// Single-writer, read-many state slot
#[derive(Debug)]
pub(crate) struct StateCell {
    state: RwLock<EngineState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::Idle),
        }
    }

    pub(crate) fn get(&self) -> EngineState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set(&self, state: EngineState) {
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Atomically move into `target`, rejecting the request if another
    /// operation is active. The returned guard marks the run `Failed` if it
    /// is dropped without `finish`.
    pub(crate) fn begin(
        self: &Arc<Self>,
        target: EngineState,
        requested: &'static str,
    ) -> Result<RunGuard, EngineError> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if state.is_busy() {
            return Err(EngineError::StateConflict {
                current: *state,
                requested,
            });
        }
        tracing::debug!(from = %*state, to = %target, "state transition");
        let previous = *state;
        *state = target;
        Ok(RunGuard {
            cell: Arc::clone(self),
            previous,
            finished: false,
        })
    }
}

pub(crate) struct RunGuard {
    cell: Arc<StateCell>,
    previous: EngineState,
    finished: bool,
}

impl RunGuard {
    /// State the engine was in when this run began
    pub(crate) fn previous(&self) -> EngineState {
        self.previous
    }

    pub(crate) fn finish(mut self, state: EngineState) {
        tracing::debug!(to = %state, "state transition");
        self.cell.set(state);
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("run ended without a final state, marking failed");
            self.cell.set(EngineState::Failed);
        }
    }
}
