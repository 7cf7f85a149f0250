//! Act timing
//!
//! Beats declared on scenes are placed on the planned manuscript length and
//! compared with their expected windows. Scenes are also checked against the
//! act boundaries.

use crate::context::ValidationContext;
use crate::violation::{count, normalize_label, ratio, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// Slack around beat windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActTimingSettings {
    /// Fraction of planned length a beat may land outside its window
    pub tolerance: f64,
    /// Check declared acts against the act boundaries
    pub check_act_boundaries: bool,
}

impl Default for ActTimingSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            check_act_boundaries: true,
        }
    }
}

/// Flags misplaced or missing beats and scenes in the wrong act
#[derive(Debug, Clone, Default)]
pub struct ActTimingValidator {
    settings: ActTimingSettings,
}

impl ActTimingValidator {
    /// Create with tolerance
    #[must_use]
    pub fn new(settings: ActTimingSettings) -> Self {
        Self { settings }
    }
}

impl Validator for ActTimingValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::ActTiming
    }

    fn evaluate(&self, units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult {
        let shape = ctx.shape;
        if shape.planned_scenes == 0 {
            return ValidatorResult::new(self.kind()).with_metric("checks", 0.0);
        }
        let tol = self.settings.tolerance.max(0.0);
        let mut violations = Vec::new();
        let mut checks = 0;

        // How far drafting has reached, as a fraction of the plan
        let drafted_through = ctx
            .scenes
            .iter()
            .chain(units.iter().copied())
            .filter_map(|s| shape.position(s.index))
            .fold(0.0_f64, f64::max);

        for beat in &shape.beats {
            let key = normalize_label(&beat.name);
            let landing = ctx
                .scenes
                .iter()
                .chain(units.iter().copied())
                .filter(|s| s.beats.iter().any(|b| normalize_label(b) == key))
                .map(|s| s.index)
                .min();

            match landing {
                Some(index) => {
                    checks += 1;
                    let Some(pos) = shape.position(index) else {
                        continue;
                    };
                    if pos < beat.start - tol || pos > beat.end + tol {
                        violations.push(
                            Violation::scored(
                                self.kind(),
                                format!(
                                    "beat '{}' lands at {:.0}%, expected {:.0}%-{:.0}%",
                                    beat.name,
                                    pos * 100.0,
                                    beat.start * 100.0,
                                    beat.end * 100.0
                                ),
                            )
                            .at_scene(index),
                        );
                    }
                }
                None if drafted_through > beat.end + tol => {
                    checks += 1;
                    violations.push(Violation::scored(
                        self.kind(),
                        format!(
                            "beat '{}' missing; expected by {:.0}%",
                            beat.name,
                            (beat.end + tol) * 100.0
                        ),
                    ));
                }
                None => {}
            }
        }

        if self.settings.check_act_boundaries {
            for scene in units {
                let Some(expected) = shape.planned_act(scene.index) else {
                    continue;
                };
                checks += 1;
                if scene.act != expected {
                    violations.push(
                        Violation::scored(
                            self.kind(),
                            format!(
                                "scene declared in act {} but falls in act {expected}",
                                scene.act
                            ),
                        )
                        .at_scene(scene.index),
                    );
                }
            }
        }

        let score = if checks == 0 {
            1.0
        } else {
            1.0 - ratio(violations.len(), checks)
        };
        ValidatorResult::new(self.kind())
            .with_score(score)
            .with_metric("checks", count(checks))
            .with_metric("drafted_through", drafted_through)
            .with_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoryShape;
    use crate::testing::Fixture;
    use novella_scene::PointOfView;

    fn scene(index: usize, act: u8) -> Scene {
        Scene::new(index, 1, act, PointOfView::Third, "draft", "Words.")
    }

    fn twenty_scene_plan() -> StoryShape {
        StoryShape::with_planned_scenes(20)
    }

    #[test]
    fn well_placed_beat_passes() {
        let mut fx = Fixture::new(vec![scene(1, 1).with_beats(["inciting incident"])]);
        fx.shape = twenty_scene_plan();
        let result = ActTimingValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(result.violations.is_empty(), "{:?}", result.violations);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn late_beat_is_flagged() {
        let mut fx = Fixture::new(vec![scene(4, 1).with_beats(["Inciting Incident"])]);
        fx.shape = twenty_scene_plan();
        let result = ActTimingValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].scene_index, Some(4));
    }

    #[test]
    fn missing_beat_after_window_is_flagged() {
        let scenes = (0..6).map(|i| scene(i, if i < 5 { 1 } else { 2 })).collect();
        let mut fx = Fixture::new(scenes);
        fx.shape = twenty_scene_plan();
        let result = ActTimingValidator::default().evaluate(&fx.units(), &fx.ctx());
        // inciting incident window closed at 17%; first plot point still open
        let missing: Vec<_> = result
            .violations
            .iter()
            .filter(|v| v.message.contains("missing"))
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("inciting incident"));
    }

    #[test]
    fn wrong_act_is_flagged() {
        let mut fx = Fixture::new(vec![scene(18, 2)]);
        fx.shape = twenty_scene_plan();
        let result = ActTimingValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(result
            .violations
            .iter()
            .any(|v| v.message.contains("falls in act 3")));
    }

    #[test]
    fn no_plan_no_checks() {
        let fx = Fixture::new(vec![scene(0, 3)]);
        let result = ActTimingValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }
}
