//! Error types for the pipeline
//!
//! Only structural problems and budget exhaustion halt a run. Quality issues
//! never surface here; they are violations inside a `QualityReport`.

use novella_gate::GateConfigError;
use novella_kernel::{BudgetError, StateMachineError};
use std::time::Duration;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Stage name not in the configured pipeline
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// Stage invoked before its prerequisites passed
    #[error("stage '{stage}' invoked before '{prerequisite}' passed")]
    OutOfOrder { stage: String, prerequisite: String },

    /// Project was aborted; no further stages may run
    #[error("project '{0}' was aborted")]
    ProjectAborted(String),

    /// Budget ceiling reached before the stage could start
    #[error("budget exhausted: spent {spent:.2} of {ceiling:.2}")]
    BudgetExhausted { spent: f64, ceiling: f64 },

    /// Snapshot store failure
    #[error("persistence failed: {0}")]
    Persistence(#[from] SnapshotError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stage state change not allowed by the state machine
    #[error(transparent)]
    IllegalTransition(#[from] StateMachineError),
}

impl PipelineError {
    /// Whether the error is a caller bug rather than a runtime condition
    #[inline]
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownStage(_) | Self::OutOfOrder { .. } | Self::IllegalTransition(_)
        )
    }
}

/// Failure of one generation call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Network or backend hiccup; retried with backoff
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// Content refused; never retried
    #[error("generation refused by policy: {0}")]
    Policy(String),

    /// Call exceeded the per-call timeout; retried with backoff
    #[error("generation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Run cancelled before the call started
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether the call may be retried
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Snapshot persistence failures
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No snapshot recorded for the project
    #[error("no snapshot for project '{0}'")]
    NotFound(String),

    /// Project id cannot be used as a storage key
    #[error("invalid project id '{0}'")]
    InvalidProjectId(String),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Pipeline configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pipeline defines no stages")]
    NoStages,

    #[error("stage '{0}' is defined more than once")]
    DuplicateStage(String),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Gate(#[from] GateConfigError),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
