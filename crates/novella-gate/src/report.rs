//! Quality reports and repair plans

use novella_kernel::state_machine::StageState;
use novella_validators::{Severity, ValidatorKind, ValidatorResult, Violation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Outcome of one stage attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    FailedRetryable,
    FailedBlocking,
}

impl Verdict {
    /// Whether the stage may advance
    #[inline]
    #[must_use]
    pub fn is_pass(self) -> bool {
        self == Self::Passed
    }
}

impl From<Verdict> for StageState {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Passed => Self::Passed,
            Verdict::FailedRetryable => Self::FailedRetryable,
            Verdict::FailedBlocking => Self::FailedBlocking,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        StageState::from(*self).fmt(f)
    }
}

/// A threshold the attempt did not meet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    /// `None` for the overall pass threshold
    pub validator: Option<ValidatorKind>,
    pub actual: f64,
    pub required: f64,
}

impl fmt::Display for ThresholdBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.validator {
            Some(v) => write!(f, "{v} scored {:.3}, minimum {:.3}", self.actual, self.required),
            None => write!(
                f,
                "overall score {:.3} below pass threshold {:.3}",
                self.actual, self.required
            ),
        }
    }
}

/// What must be regenerated, and why
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepairEntry {
    /// Stage that must regenerate
    pub stage: String,
    /// Unit to regenerate; `None` means the whole stage
    #[serde(default)]
    pub scene_index: Option<usize>,
    pub validator: ValidatorKind,
    pub severity: Severity,
    pub reason: String,
    /// The unit cannot be regenerated automatically
    #[serde(default)]
    pub hard_stop: bool,
}

/// Ordered repair entries; blocking entries first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPlan {
    entries: Vec<RepairEntry>,
}

impl RepairPlan {
    /// Build from entries, ordered and deduplicated
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = RepairEntry>) -> Self {
        let mut entries: Vec<RepairEntry> = entries.into_iter().collect();
        entries.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.scene_index.cmp(&b.scene_index))
                .then_with(|| a.cmp(b))
        });
        entries.dedup();
        Self { entries }
    }

    /// All entries
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[RepairEntry] {
        &self.entries
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the plan is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stages named by the plan
    #[must_use]
    pub fn stages(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.stage.as_str()).collect()
    }

    /// Units to regenerate in `stage`, excluding hard stops
    #[must_use]
    pub fn units_for(&self, stage: &str) -> BTreeSet<usize> {
        self.entries
            .iter()
            .filter(|e| e.stage == stage && !e.hard_stop)
            .filter_map(|e| e.scene_index)
            .collect()
    }

    /// Whether `stage` must be regenerated as a whole
    #[must_use]
    pub fn whole_stage(&self, stage: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.stage == stage && e.scene_index.is_none())
    }

    /// Whether any entry cannot be retried automatically
    #[must_use]
    pub fn has_hard_stop(&self) -> bool {
        self.entries.iter().any(|e| e.hard_stop)
    }
}

/// Result of evaluating one stage attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub stage: String,
    /// Scene indices evaluated
    #[serde(default)]
    pub units: Vec<usize>,
    /// Weighted overall score in [0, 1]
    pub overall_score: f64,
    /// Per-validator results, in profile order
    #[serde(default)]
    pub results: Vec<ValidatorResult>,
    /// Every violation, validator results first, then gate findings
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub violated_thresholds: Vec<ThresholdBreach>,
    pub verdict: Verdict,
    /// Present exactly when the verdict is not `Passed`
    #[serde(default)]
    pub repair_plan: Option<RepairPlan>,
}

impl QualityReport {
    /// Whether the stage passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// Blocking violations
    pub fn blocking_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_blocking())
    }

    /// Score of one validator, if it ran
    #[must_use]
    pub fn score_of(&self, kind: ValidatorKind) -> Option<f64> {
        self.results
            .iter()
            .find(|r| r.validator == kind)
            .map(|r| r.score)
    }

    /// Result of one validator, if it ran
    #[must_use]
    pub fn result_of(&self, kind: ValidatorKind) -> Option<&ValidatorResult> {
        self.results.iter().find(|r| r.validator == kind)
    }
}
