//! Novella Quality Gate
//!
//! Decides whether a stage attempt may advance.
//!
//! # Core Concepts
//!
//! - [`QualityGate`]: Runs a stage's validator subset and applies the verdict rule
//! - [`GateConfig`]: Pass threshold, per-stage weights and minimums, validator settings
//! - [`QualityReport`]: Scores, violations, breached thresholds and verdict
//! - [`RepairPlan`]: Which stage must regenerate which unit, and why
//!
//! A stage passes when its weighted score reaches the pass threshold, every
//! per-validator minimum holds and no violation is blocking. Any blocking
//! violation fails the stage outright.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
mod gate;
pub mod report;

pub use config::{GateConfig, GateConfigError, StageProfile, WeightedValidator, DEFAULT_PASS_THRESHOLD};
pub use gate::QualityGate;
pub use report::{QualityReport, RepairEntry, RepairPlan, ThresholdBreach, Verdict};

/// Common imports
pub mod prelude {
    pub use crate::config::{GateConfig, StageProfile, WeightedValidator, DEFAULT_PASS_THRESHOLD};
    pub use crate::gate::QualityGate;
    pub use crate::report::{QualityReport, RepairEntry, RepairPlan, Verdict};
    pub use novella_validators::{Severity, ValidationContext, ValidatorKind, Violation};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
