//! Violations and validator results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which validator produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Pov,
    SceneStructure,
    Rhythm,
    DialogueSubtext,
    MotifEvolution,
    Repetition,
    Duplication,
    ActTiming,
    Continuity,
    /// Generation refused a unit; never configured, raised by the gate
    Generation,
}

impl ValidatorKind {
    /// Every configurable validator
    pub const ALL: [Self; 9] = [
        Self::Pov,
        Self::SceneStructure,
        Self::Rhythm,
        Self::DialogueSubtext,
        Self::MotifEvolution,
        Self::Repetition,
        Self::Duplication,
        Self::ActTiming,
        Self::Continuity,
    ];

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pov => "pov",
            Self::SceneStructure => "scene_structure",
            Self::Rhythm => "rhythm",
            Self::DialogueSubtext => "dialogue_subtext",
            Self::MotifEvolution => "motif_evolution",
            Self::Repetition => "repetition",
            Self::Duplication => "duplication",
            Self::ActTiming => "act_timing",
            Self::Continuity => "continuity",
            Self::Generation => "generation",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a violation affects the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lowers the validator score only
    Scored,
    /// Fails the stage regardless of score
    Blocking,
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub validator: ValidatorKind,
    pub severity: Severity,
    /// Offending scene; `None` for project-level findings
    #[serde(default)]
    pub scene_index: Option<usize>,
    #[serde(default)]
    pub paragraph: Option<usize>,
    pub message: String,
}

impl Violation {
    /// Scored violation
    #[must_use]
    pub fn scored(validator: ValidatorKind, message: impl Into<String>) -> Self {
        Self {
            validator,
            severity: Severity::Scored,
            scene_index: None,
            paragraph: None,
            message: message.into(),
        }
    }

    /// Blocking violation
    #[must_use]
    pub fn blocking(validator: ValidatorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Blocking,
            ..Self::scored(validator, message)
        }
    }

    /// Attach to a scene
    #[inline]
    #[must_use]
    pub fn at_scene(mut self, scene_index: usize) -> Self {
        self.scene_index = Some(scene_index);
        self
    }

    /// Attach to a paragraph of the scene
    #[inline]
    #[must_use]
    pub fn at_paragraph(mut self, paragraph: usize) -> Self {
        self.paragraph = Some(paragraph);
        self
    }

    /// Whether this violation fails the stage outright
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.validator)?;
        if let Some(scene) = self.scene_index {
            write!(f, " scene {scene}")?;
        }
        if let Some(paragraph) = self.paragraph {
            write!(f, " paragraph {paragraph}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of one validator over a set of units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator: ValidatorKind,
    /// Score in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ValidatorResult {
    /// Perfect result with no findings
    #[must_use]
    pub fn new(validator: ValidatorKind) -> Self {
        Self {
            validator,
            score: 1.0,
            violations: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Set score, clamped to [0, 1]; NaN becomes 0
    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        self
    }

    /// Record a metric
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Append findings
    #[must_use]
    pub fn with_violations(mut self, violations: impl IntoIterator<Item = Violation>) -> Self {
        self.violations.extend(violations);
        self
    }

    /// Whether any finding is blocking
    #[must_use]
    pub fn has_blocking(&self) -> bool {
        self.violations.iter().any(Violation::is_blocking)
    }
}

/// `num / den`, or 0 for an empty denominator
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Count as a metric value
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn count(n: usize) -> f64 {
    n as f64
}

/// Case, spacing and separator insensitive label key
#[must_use]
pub(crate) fn normalize_label(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_clamped() {
        let r = ValidatorResult::new(ValidatorKind::Rhythm).with_score(1.7);
        assert!((r.score - 1.0).abs() < f64::EPSILON);
        let r = ValidatorResult::new(ValidatorKind::Rhythm).with_score(f64::NAN);
        assert!(r.score.abs() < f64::EPSILON);
    }

    #[test]
    fn display_names_location() {
        let v = Violation::blocking(ValidatorKind::Pov, "switch to third person")
            .at_scene(3)
            .at_paragraph(2);
        assert_eq!(v.to_string(), "[pov] scene 3 paragraph 2: switch to third person");
        assert!(v.is_blocking());
    }

    #[test]
    fn labels_normalize() {
        assert_eq!(normalize_label("Inciting_Incident"), "inciting incident");
        assert_eq!(normalize_label("  mid-point "), "mid point");
    }

    #[test]
    fn ratio_of_nothing_is_zero() {
        assert!(ratio(3, 0).abs() < f64::EPSILON);
        assert!((ratio(1, 4) - 0.25).abs() < f64::EPSILON);
    }
}
