//! Scene structure
//!
//! Looks for cue words of four elements in order: a goal early in the scene,
//! then a conflict, then a value shift, then a closing hook. Every chapter-one
//! scene must also carry an inciting incident.

use crate::context::ValidationContext;
use crate::violation::{count, normalize_label, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::text::{position_of_phrase, sentences, words};
use novella_scene::{Scene, StructuralTags};
use serde::{Deserialize, Serialize};

/// Cue lexicons and windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    /// The goal cue must start within this many words
    pub goal_window: usize,
    /// The hook cue must start within this many final words
    pub hook_window: usize,
    pub goal_cues: Vec<String>,
    pub conflict_cues: Vec<String>,
    pub shift_cues: Vec<String>,
    pub hook_cues: Vec<String>,
    pub inciting_cues: Vec<String>,
    /// Declared beat that counts as the inciting incident
    pub inciting_beat: String,
}

impl Default for StructureSettings {
    fn default() -> Self {
        let list = |ws: &[&str]| ws.iter().map(|w| (*w).to_string()).collect();
        Self {
            goal_window: 150,
            hook_window: 60,
            goal_cues: list(&[
                "wanted", "wants", "needed", "needs", "had to", "have to", "must", "determined to",
                "intended to", "planned to", "set out to", "hoped to", "meant to", "goal",
            ]),
            conflict_cues: list(&[
                "but", "however", "refused", "blocked", "couldn't", "could not", "wouldn't",
                "against", "obstacle", "threat", "denied", "struggled", "fought", "resisted",
                "too late", "locked",
            ]),
            shift_cues: list(&[
                "now", "no longer", "for the first time", "realized", "instead",
                "everything changed", "at last", "anymore", "understood", "suddenly",
            ]),
            hook_cues: list(&[
                "until", "behind her", "behind him", "knock", "scream", "gone", "never",
                "what if", "who", "why", "tomorrow", "waiting", "footsteps", "then",
            ]),
            inciting_cues: list(&[
                "letter", "phone rang", "arrived", "discovered", "found", "news", "disappeared",
                "murdered", "summons", "accident", "stranger", "vanished", "knock at the door",
            ]),
            inciting_beat: "inciting incident".to_string(),
        }
    }
}

/// Checks goal, conflict, shift and hook order
#[derive(Debug, Clone, Default)]
pub struct StructureValidator {
    settings: StructureSettings,
}

fn first_cue(tokens: &[String], cues: &[String], from: usize) -> Option<usize> {
    let tail = tokens.get(from..)?;
    cues.iter()
        .filter_map(|cue| position_of_phrase(tail, cue))
        .min()
        .map(|p| p + from)
}

impl StructureValidator {
    /// Create with lexicons
    #[must_use]
    pub fn new(settings: StructureSettings) -> Self {
        Self { settings }
    }

    /// Structural elements present in `text`, respecting their order
    #[must_use]
    pub fn detect(&self, text: &str) -> StructuralTags {
        let s = &self.settings;
        let tokens = words(text);

        let goal = first_cue(&tokens, &s.goal_cues, 0).filter(|p| *p < s.goal_window);
        let conflict = first_cue(&tokens, &s.conflict_cues, goal.map_or(0, |p| p + 1));
        let shift = first_cue(
            &tokens,
            &s.shift_cues,
            conflict.or(goal).map_or(0, |p| p + 1),
        );

        let hook_start = tokens
            .len()
            .saturating_sub(s.hook_window)
            .max(shift.or(conflict).or(goal).map_or(0, |p| p + 1));
        let ends_open = sentences(text).last().is_some_and(|last| {
            let last = last.trim_end_matches(['"', '\'', '”', '’', ')']);
            last.ends_with('?') || last.ends_with('…') || last.ends_with("...")
        });
        let hook = ends_open || first_cue(&tokens, &s.hook_cues, hook_start).is_some();

        StructuralTags {
            goal: goal.is_some(),
            conflict: conflict.is_some(),
            turn: shift.is_some(),
            hook,
            inciting_incident: first_cue(&tokens, &s.inciting_cues, 0).is_some(),
        }
    }

    fn has_inciting(&self, scene: &Scene, tags: &StructuralTags) -> bool {
        let beat = normalize_label(&self.settings.inciting_beat);
        tags.inciting_incident || scene.beats.iter().any(|b| normalize_label(b) == beat)
    }
}

impl Validator for StructureValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::SceneStructure
    }

    fn evaluate(&self, units: &[&Scene], _ctx: &ValidationContext<'_>) -> ValidatorResult {
        let mut violations = Vec::new();
        let mut present = 0;

        for scene in units {
            let tags = self.detect(scene.text());
            present += tags.core_count();
            for (ok, element) in [
                (tags.goal, "goal statement near the opening"),
                (tags.conflict, "conflict or obstacle after the goal"),
                (tags.turn, "value shift after the conflict"),
                (tags.hook, "closing hook"),
            ] {
                if !ok {
                    violations.push(
                        Violation::scored(self.kind(), format!("missing {element}"))
                            .at_scene(scene.index),
                    );
                }
            }

            // every chapter-one scene carries its own inciting incident
            if scene.chapter == 1 && !self.has_inciting(scene, &tags) {
                violations.push(
                    Violation::blocking(
                        self.kind(),
                        format!("chapter 1 scene {} has no inciting incident", scene.index),
                    )
                    .at_scene(scene.index),
                );
            }
        }

        let elements = units.len() * 4;
        let score = if elements == 0 {
            1.0
        } else {
            crate::violation::ratio(present, elements)
        };
        ValidatorResult::new(self.kind())
            .with_score(score)
            .with_metric("elements_present", count(present))
            .with_metric("elements_expected", count(elements))
            .with_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use novella_scene::PointOfView;

    const COMPLETE: &str = "Mara needed the ledger before dawn. \
        But the vault door was locked and the guard refused to move. \
        She realized the key had been in her pocket all along. \
        Then footsteps sounded behind her.";

    #[test]
    fn detects_all_elements_in_order() {
        let tags = StructureValidator::default().detect(COMPLETE);
        assert!(tags.goal && tags.conflict && tags.turn && tags.hook);
        assert_eq!(tags.core_count(), 4);
    }

    #[test]
    fn out_of_order_shift_is_missing() {
        // the only shift cue comes before the goal and conflict
        let text = "Now the rain came. Mara needed shelter. But every door refused her.";
        let tags = StructureValidator::default().detect(text);
        assert!(tags.goal);
        assert!(tags.conflict);
        assert!(!tags.turn);
    }

    #[test]
    fn question_ending_is_a_hook() {
        let tags = StructureValidator::default().detect("Mara wanted out. Was anyone listening?");
        assert!(tags.hook);
    }

    #[test]
    fn bare_chapter_one_scene_blocks() {
        let scene = Scene::new(0, 1, 1, PointOfView::Third, "draft", "The kettle sat on the stove.");
        let fx = Fixture::new(vec![scene]);
        let result = StructureValidator::default().evaluate(&fx.units(), &fx.ctx());

        assert!(result.has_blocking());
        assert!(result.score.abs() < f64::EPSILON);
        assert_eq!(result.violations.iter().filter(|v| !v.is_blocking()).count(), 4);
    }

    #[test]
    fn declared_inciting_beat_satisfies_chapter_one() {
        let scene = Scene::new(0, 1, 1, PointOfView::Third, "draft", COMPLETE)
            .with_beats(["Inciting_Incident"]);
        let fx = Fixture::new(vec![scene]);
        let result = StructureValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(!result.has_blocking());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn each_chapter_one_scene_needs_its_own_incident() {
        let fx = Fixture::new(vec![
            Scene::new(0, 1, 1, PointOfView::Third, "draft", "A letter arrived for Mara."),
            Scene::new(1, 1, 1, PointOfView::Third, "draft", "The kettle sat on the stove."),
            Scene::new(2, 1, 1, PointOfView::Third, "draft", "Dust lay on the shelf."),
        ]);
        let result = StructureValidator::default().evaluate(&fx.units(), &fx.ctx());

        let blocked: Vec<_> = result
            .violations
            .iter()
            .filter(|v| v.is_blocking())
            .map(|v| v.scene_index)
            .collect();
        assert_eq!(blocked, vec![Some(1), Some(2)]);
    }

    #[test]
    fn later_chapters_never_block() {
        let scene = Scene::new(5, 3, 2, PointOfView::Third, "draft", "The kettle sat on the stove.");
        let fx = Fixture::new(vec![scene]);
        let result = StructureValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(!result.has_blocking());
    }
}
