//! Near-duplicate scene detection by shingle fingerprints

use crate::context::ValidationContext;
use crate::violation::{count, ratio, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::{Fingerprint, Scene, DEFAULT_SHINGLE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Highest threshold a configuration may use
pub const MAX_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Fingerprint parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicationSettings {
    pub shingle_size: usize,
    /// Jaccard similarity at or above which two scenes are duplicates
    pub threshold: f64,
}

impl Default for DuplicationSettings {
    fn default() -> Self {
        Self {
            shingle_size: DEFAULT_SHINGLE_SIZE,
            threshold: 0.8,
        }
    }
}

impl DuplicationSettings {
    /// Threshold actually applied, never above [`MAX_DUPLICATE_THRESHOLD`]
    #[inline]
    #[must_use]
    pub fn effective_threshold(&self) -> f64 {
        self.threshold.min(MAX_DUPLICATE_THRESHOLD)
    }
}

/// Flags unit scenes too similar to any other project scene (blocking)
#[derive(Debug, Clone, Default)]
pub struct DuplicationValidator {
    settings: DuplicationSettings,
}

impl DuplicationValidator {
    /// Create with parameters
    #[must_use]
    pub fn new(settings: DuplicationSettings) -> Self {
        Self { settings }
    }
}

impl Validator for DuplicationValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Duplication
    }

    fn evaluate(&self, units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult {
        let k = self.settings.shingle_size;
        let threshold = self.settings.effective_threshold();

        // Units win over stale project copies of the same index
        let mut pool: BTreeMap<usize, &Scene> = ctx.scenes.iter().map(|s| (s.index, s)).collect();
        pool.extend(units.iter().map(|s| (s.index, *s)));
        let prints: BTreeMap<usize, Fingerprint> =
            pool.iter().map(|(i, s)| (*i, s.fingerprint(k))).collect();
        let unit_indices: BTreeSet<usize> = units.iter().map(|s| s.index).collect();

        let mut violations = Vec::new();
        let mut duplicated: BTreeSet<usize> = BTreeSet::new();
        let mut max_similarity: f64 = 0.0;

        for &unit in &unit_indices {
            let Some(print) = prints.get(&unit) else {
                continue;
            };
            for (&other, other_print) in &prints {
                // each pair once: skip self, and unit pairs already seen from the lower side
                if other == unit || (unit_indices.contains(&other) && other < unit) {
                    continue;
                }
                let similarity = print.similarity(other_print);
                max_similarity = max_similarity.max(similarity);
                if similarity >= threshold {
                    let (flagged, original) = if unit_indices.contains(&other) {
                        (unit.max(other), unit.min(other))
                    } else {
                        (unit, other)
                    };
                    duplicated.insert(flagged);
                    violations.push(
                        Violation::blocking(
                            self.kind(),
                            format!(
                                "scene {flagged} duplicates scene {original} (similarity {similarity:.2})"
                            ),
                        )
                        .at_scene(flagged),
                    );
                }
            }
        }

        let score = if unit_indices.is_empty() {
            1.0
        } else {
            1.0 - ratio(duplicated.len(), unit_indices.len())
        };
        ValidatorResult::new(self.kind())
            .with_score(score)
            .with_metric("max_similarity", max_similarity)
            .with_metric("duplicated_units", count(duplicated.len()))
            .with_violations(violations)
    }
}
