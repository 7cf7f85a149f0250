//! Motif evolution over the story bible

use crate::context::ValidationContext;
use crate::violation::{count, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// Distance threshold for "evolved"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotifSettings {
    /// Word-set Jaccard distance two acts' manifestations must exceed
    pub min_distance: f64,
}

impl Default for MotifSettings {
    fn default() -> Self {
        Self { min_distance: 0.2 }
    }
}

/// Scores the fraction of tracked motifs that change across acts
#[derive(Debug, Clone, Default)]
pub struct MotifValidator {
    settings: MotifSettings,
}

impl MotifValidator {
    /// Create with threshold
    #[must_use]
    pub fn new(settings: MotifSettings) -> Self {
        Self { settings }
    }
}

impl Validator for MotifValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::MotifEvolution
    }

    fn evaluate(&self, _units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult {
        let threshold = self.settings.min_distance;
        let violations = ctx.registry.static_motifs(threshold).into_iter().map(|m| {
            let acts: Vec<String> = m.manifestations.keys().map(ToString::to_string).collect();
            let detail = if acts.len() < 2 {
                format!("only manifests in act {}", acts.join(", "))
            } else {
                format!("manifests identically in acts {}", acts.join(", "))
            };
            Violation::scored(self.kind(), format!("motif '{}' is static: {detail}", m.label))
        });

        ValidatorResult::new(self.kind())
            .with_score(ctx.registry.evolution_score(threshold))
            .with_metric("tracked_motifs", count(ctx.registry.motifs().count()))
            .with_violations(violations)
    }
}
