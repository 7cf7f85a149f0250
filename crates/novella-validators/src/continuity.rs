//! Continuity findings from the story bible

use crate::context::ValidationContext;
use crate::violation::{count, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_bible::ContinuityKind;
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// Drop window and penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuitySettings {
    /// Scenes an unresolved thread may go unreferenced
    pub drop_window: usize,
    pub penalty_per_violation: f64,
}

impl Default for ContinuitySettings {
    fn default() -> Self {
        Self {
            drop_window: 10,
            penalty_per_violation: 0.1,
        }
    }
}

/// Scores role conflicts, malformed mentions and dropped threads
#[derive(Debug, Clone, Default)]
pub struct ContinuityValidator {
    settings: ContinuitySettings,
}

impl ContinuityValidator {
    /// Create with window
    #[must_use]
    pub fn new(settings: ContinuitySettings) -> Self {
        Self { settings }
    }
}

impl Validator for ContinuityValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Continuity
    }

    fn evaluate(&self, _units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult {
        let mut violations: Vec<Violation> = ctx
            .continuity
            .iter()
            .map(|c| {
                let message = match &c.kind {
                    ContinuityKind::RoleConflict {
                        name,
                        recorded,
                        proposed,
                    } => format!(
                        "{name} appears as {proposed} but is recorded as {recorded}; flag a role transition or keep the role"
                    ),
                    ContinuityKind::MalformedPayload { entity, reason } => {
                        format!("malformed {entity} mention: {reason}")
                    }
                };
                Violation::scored(self.kind(), message).at_scene(c.scene_index)
            })
            .collect();
        let conflicts = violations.len();

        let dropped = ctx
            .registry
            .sweep_dropped_threads(ctx.current_scene_index, self.settings.drop_window);
        violations.extend(dropped.iter().map(|t| {
            Violation::scored(
                self.kind(),
                format!(
                    "thread '{}' unreferenced since scene {} (window {})",
                    t.label, t.last_referenced, self.settings.drop_window
                ),
            )
        }));

        let penalty = count(violations.len()) * self.settings.penalty_per_violation;
        ValidatorResult::new(self.kind())
            .with_score(1.0 - penalty)
            .with_metric("continuity_violations", count(conflicts))
            .with_metric("dropped_threads", count(dropped.len()))
            .with_metric(
                "unresolved_threads",
                count(ctx.registry.unresolved_threads().count()),
            )
            .with_violations(violations)
    }
}
