//! Point-of-view consistency
//!
//! Narration outside quoted dialogue is classified per paragraph by pronoun
//! evidence. First-person markers win over second, second over third, since
//! first-person narrators still refer to others as "she" or "they".

use crate::context::ValidationContext;
use crate::violation::{count, ratio, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::text::{paragraphs, strip_dialogue, words};
use novella_scene::{PointOfView, Scene};
use serde::{Deserialize, Serialize};

/// Pronoun lexicons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PovSettings {
    pub first_person: Vec<String>,
    pub second_person: Vec<String>,
    pub third_person: Vec<String>,
}

impl Default for PovSettings {
    fn default() -> Self {
        let list = |ws: &[&str]| ws.iter().map(|w| (*w).to_string()).collect();
        Self {
            first_person: list(&[
                "i", "me", "my", "mine", "myself", "i'm", "i'd", "i'll", "i've", "we", "us",
                "our", "ours", "ourselves",
            ]),
            second_person: list(&["you", "your", "yours", "yourself", "yourselves", "you're"]),
            third_person: list(&[
                "he", "him", "his", "himself", "she", "her", "hers", "herself", "they", "them",
                "their", "theirs", "themselves",
            ]),
        }
    }
}

/// Checks that narration keeps the declared narrating person
#[derive(Debug, Clone, Default)]
pub struct PovValidator {
    settings: PovSettings,
}

impl PovValidator {
    /// Create with lexicons
    #[must_use]
    pub fn new(settings: PovSettings) -> Self {
        Self { settings }
    }

    /// Narrating person of a paragraph, `None` without pronoun evidence
    #[must_use]
    pub fn classify(&self, paragraph: &str) -> Option<PointOfView> {
        let narration = words(&strip_dialogue(paragraph));
        let has = |lexicon: &[String]| narration.iter().any(|w| lexicon.contains(w));
        if has(&self.settings.first_person) {
            Some(PointOfView::First)
        } else if has(&self.settings.second_person) {
            Some(PointOfView::Second)
        } else if has(&self.settings.third_person) {
            Some(PointOfView::Third)
        } else {
            None
        }
    }

    fn check_scene(&self, scene: &Scene, out: &mut Vec<Violation>) -> (usize, usize) {
        let mut matching = 0;
        let mut classified = 0;
        for (i, paragraph) in paragraphs(scene.text()).into_iter().enumerate() {
            if scene.is_frame_break(i) {
                continue;
            }
            let Some(pov) = self.classify(paragraph) else {
                continue;
            };
            classified += 1;
            if pov == scene.pov {
                matching += 1;
            } else {
                out.push(
                    Violation::scored(
                        ValidatorKind::Pov,
                        format!(
                            "paragraph {i} reads as {pov} person in a {} person scene",
                            scene.pov
                        ),
                    )
                    .at_scene(scene.index)
                    .at_paragraph(i),
                );
            }
        }
        (matching, classified)
    }
}

impl Validator for PovValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Pov
    }

    fn evaluate(&self, units: &[&Scene], _ctx: &ValidationContext<'_>) -> ValidatorResult {
        let mut violations = Vec::new();
        let (mut matching, mut classified) = (0, 0);
        for scene in units {
            let (m, c) = self.check_scene(scene, &mut violations);
            matching += m;
            classified += c;
        }

        let score = if classified == 0 {
            1.0
        } else {
            ratio(matching, classified)
        };
        ValidatorResult::new(self.kind())
            .with_score(score)
            .with_metric("classified_paragraphs", count(classified))
            .with_metric("mismatched_paragraphs", count(classified - matching))
            .with_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    const FIRST_WITH_SLIP: &str = "I pushed the door open and my hands shook.\n\n\
        I saw her by the window. \"You came,\" she said.\n\n\
        He crossed the room and his coat dripped on the floor.\n\n\
        I did not answer him.";

    #[test]
    fn third_person_slip_is_flagged() {
        let scene = Scene::new(0, 1, 1, PointOfView::First, "draft", FIRST_WITH_SLIP);
        let fx = Fixture::new(vec![scene]);
        let result = PovValidator::default().evaluate(&fx.units(), &fx.ctx());

        assert!(result.score < 1.0);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].paragraph, Some(2));
        assert_eq!(result.violations[0].scene_index, Some(0));
        assert!(!result.has_blocking());
    }

    #[test]
    fn frame_break_is_excused() {
        let scene = Scene::new(0, 1, 1, PointOfView::First, "draft", FIRST_WITH_SLIP)
            .with_frame_breaks([2]);
        let fx = Fixture::new(vec![scene]);
        let result = PovValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn dialogue_pronouns_do_not_count() {
        let v = PovValidator::default();
        assert_eq!(
            v.classify("\"I never wanted this,\" Mara told the captain, and he nodded."),
            Some(PointOfView::Third)
        );
        assert_eq!(v.classify("Rain. Only rain."), None);
    }

    #[test]
    fn no_evidence_scores_full() {
        let scene = Scene::new(0, 1, 1, PointOfView::Second, "draft", "Rain on the roof.");
        let fx = Fixture::new(vec![scene]);
        let result = PovValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }
}
