//! Stage and run state machines

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Passed,
    FailedRetryable,
    FailedBlocking,
    Aborted,
}

impl StageState {
    /// Terminal verdict of an attempt
    #[inline]
    #[must_use]
    pub fn is_verdict(self) -> bool {
        matches!(
            self,
            Self::Passed | Self::FailedRetryable | Self::FailedBlocking
        )
    }

    /// Whether the stage failed in any way
    #[inline]
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::FailedRetryable | Self::FailedBlocking)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::FailedRetryable => "FAILED_RETRYABLE",
            Self::FailedBlocking => "FAILED_BLOCKING",
            Self::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

/// Run-level status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    /// A stage is `FailedBlocking`; waiting for repair
    Blocked,
    /// Every stage passed
    Complete,
    Aborted,
}

impl RunStatus {
    /// No further progress without intervention
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::Blocked => "BLOCKED",
            Self::Complete => "COMPLETE",
            Self::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

/// Validates a stage state transition.
///
/// Illegal transitions return an error; with the `strict-debug` feature they
/// panic instead.
///
/// # Errors
/// `StateMachineError::IllegalTransition` when `to` is not reachable from `from`.
pub fn validate_transition(from: StageState, to: StageState) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal stage transition attempted: {from} -> {to}");

        #[cfg(not(feature = "strict-debug"))]
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step.
///
/// `Passed -> Running` and `FailedBlocking -> Running` are repair re-entry.
#[must_use]
pub fn allowed_transitions(from: StageState) -> Vec<StageState> {
    use StageState::{Aborted, FailedBlocking, FailedRetryable, Passed, Pending, Running};
    match from {
        Pending => vec![Running, Aborted],
        Running => vec![Passed, FailedRetryable, FailedBlocking, Aborted],
        FailedRetryable => vec![Running, FailedBlocking, Aborted],
        FailedBlocking => vec![Running, Aborted],
        Passed => vec![Running],
        Aborted => vec![],
    }
}

fn allowed(from: StageState, to: StageState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
