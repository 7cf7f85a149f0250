//! Gate configuration
//!
//! Which validators run for which stage, with what weight, and the score a
//! stage needs to pass.

use novella_validators::{ValidatorKind, ValidatorSettings, MAX_DUPLICATE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default overall score needed to pass
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.85;

/// One validator in a stage profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedValidator {
    pub validator: ValidatorKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Score below which the stage fails regardless of the weighted total
    #[serde(default)]
    pub min_score: Option<f64>,
}

fn default_weight() -> f64 {
    1.0
}

impl WeightedValidator {
    /// Weight 1, no minimum
    #[must_use]
    pub fn new(validator: ValidatorKind) -> Self {
        Self {
            validator,
            weight: 1.0,
            min_score: None,
        }
    }

    /// Set weight
    #[inline]
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set minimum score
    #[inline]
    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Validator subset of one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageProfile {
    pub validators: Vec<WeightedValidator>,
}

impl StageProfile {
    /// Profile from validators
    #[must_use]
    pub fn of(validators: impl IntoIterator<Item = WeightedValidator>) -> Self {
        Self {
            validators: validators.into_iter().collect(),
        }
    }

    /// Whether `kind` runs in this profile
    #[must_use]
    pub fn contains(&self, kind: ValidatorKind) -> bool {
        self.validators.iter().any(|v| v.validator == kind)
    }
}

/// Quality gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub pass_threshold: f64,
    /// Stage name -> validator subset
    pub stages: BTreeMap<String, StageProfile>,
    /// Used for stages without their own profile
    pub default_profile: StageProfile,
    pub validators: ValidatorSettings,
}

impl Default for GateConfig {
    fn default() -> Self {
        use ValidatorKind::{
            ActTiming, Continuity, DialogueSubtext, Duplication, MotifEvolution, Pov, Repetition,
            Rhythm, SceneStructure,
        };
        let w = WeightedValidator::new;

        let draft = StageProfile::of([
            w(Pov).with_weight(2.0),
            w(SceneStructure).with_weight(2.0),
            w(Duplication),
            w(Repetition).with_weight(0.5),
            w(Continuity),
        ]);
        let polish = StageProfile::of([
            w(Pov),
            w(Rhythm).with_weight(1.5),
            w(DialogueSubtext),
            w(Repetition),
            w(Duplication),
            w(Continuity),
        ]);
        let audit = StageProfile::of([
            w(MotifEvolution).with_min_score(0.5),
            w(ActTiming),
            w(Continuity),
            w(Repetition),
            w(Duplication),
        ]);
        let default_profile = StageProfile::of([
            w(Pov),
            w(SceneStructure),
            w(Rhythm),
            w(Repetition),
            w(Duplication),
            w(Continuity),
        ]);

        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            stages: BTreeMap::from([
                ("draft".to_string(), draft),
                ("polish".to_string(), polish),
                ("audit".to_string(), audit),
            ]),
            default_profile,
            validators: ValidatorSettings::default(),
        }
    }
}

impl GateConfig {
    /// Set pass threshold
    #[inline]
    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Set or replace a stage profile
    #[inline]
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>, profile: StageProfile) -> Self {
        self.stages.insert(stage.into(), profile);
        self
    }

    /// Set validator settings
    #[inline]
    #[must_use]
    pub fn with_validators(mut self, validators: ValidatorSettings) -> Self {
        self.validators = validators;
        self
    }

    /// Profile for `stage`, or the default one
    #[must_use]
    pub fn profile(&self, stage: &str) -> &StageProfile {
        self.stages.get(stage).unwrap_or(&self.default_profile)
    }

    /// Check values are usable.
    ///
    /// # Errors
    /// The first inconsistent value found.
    pub fn validate(&self) -> Result<(), GateConfigError> {
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(GateConfigError::PassThreshold(self.pass_threshold));
        }
        let threshold = self.validators.duplication.threshold;
        if !(threshold > 0.0 && threshold <= MAX_DUPLICATE_THRESHOLD) {
            return Err(GateConfigError::DuplicationThreshold(threshold));
        }

        let profiles = self
            .stages
            .iter()
            .map(|(name, p)| (name.as_str(), p))
            .chain(std::iter::once(("<default>", &self.default_profile)));
        for (stage, profile) in profiles {
            for v in &profile.validators {
                if v.validator == ValidatorKind::Generation {
                    return Err(GateConfigError::NotConfigurable {
                        stage: stage.to_string(),
                        validator: v.validator,
                    });
                }
                if !(v.weight.is_finite() && v.weight >= 0.0) {
                    return Err(GateConfigError::Weight {
                        stage: stage.to_string(),
                        validator: v.validator,
                        weight: v.weight,
                    });
                }
                if let Some(min) = v.min_score {
                    if !(0.0..=1.0).contains(&min) {
                        return Err(GateConfigError::MinScore {
                            stage: stage.to_string(),
                            validator: v.validator,
                            min_score: min,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Inconsistent gate configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateConfigError {
    #[error("pass threshold must be in [0, 1], got {0}")]
    PassThreshold(f64),

    #[error("duplication threshold must be in (0, 0.95], got {0}")]
    DuplicationThreshold(f64),

    #[error("stage '{stage}': weight of {validator} must be non-negative, got {weight}")]
    Weight {
        stage: String,
        validator: ValidatorKind,
        weight: f64,
    },

    #[error("stage '{stage}': minimum score of {validator} must be in [0, 1], got {min_score}")]
    MinScore {
        stage: String,
        validator: ValidatorKind,
        min_score: f64,
    },

    #[error("stage '{stage}': {validator} cannot be configured")]
    NotConfigurable {
        stage: String,
        validator: ValidatorKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn unknown_stage_uses_default_profile() {
        let config = GateConfig::default();
        assert_eq!(config.profile("revise-dialogue"), &config.default_profile);
        assert!(config.profile("audit").contains(ValidatorKind::MotifEvolution));
    }

    #[test]
    fn rejects_loose_duplication_threshold() {
        let mut config = GateConfig::default();
        config.validators.duplication.threshold = 0.97;
        assert_eq!(
            config.validate(),
            Err(GateConfigError::DuplicationThreshold(0.97))
        );
    }

    #[test]
    fn rejects_negative_weight() {
        let config = GateConfig::default().with_stage(
            "draft",
            StageProfile::of([WeightedValidator::new(ValidatorKind::Pov).with_weight(-1.0)]),
        );
        assert!(matches!(config.validate(), Err(GateConfigError::Weight { .. })));
    }

    #[test]
    fn loads_from_toml() {
        let toml = r#"
            pass_threshold = 0.9

            [stages.draft]
            validators = [
                { validator = "pov", weight = 2.0 },
                { validator = "duplication", min_score = 1.0 },
            ]

            [validators.duplication]
            threshold = 0.75
        "#;
        let config: GateConfig = toml::from_str(toml).unwrap();
        assert!((config.pass_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.profile("draft").validators.len(), 2);
        assert!(!config.stages.contains_key("polish"));
        assert!(config.validate().is_ok());
    }
}
