//! Kernel error types

use crate::state_machine::StageState;

/// Illegal stage state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed table
    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: StageState, to: StageState },
}

/// Stage journal failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    /// Entry hash or back-link does not match
    #[error("journal integrity violation at entry {sequence}")]
    IntegrityViolation { sequence: u64 },
}

/// Budget configuration or accounting failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetError {
    /// Ceiling must be positive and finite
    #[error("budget ceiling must be positive, got {0}")]
    InvalidCeiling(f64),

    /// Low-balance fraction outside [0, 1)
    #[error("low balance fraction must be in [0, 1), got {0}")]
    InvalidLowBalanceFraction(f64),

    /// Negative or non-finite rate
    #[error("rate for tier {tier} must be non-negative")]
    InvalidRate { tier: String },
}
