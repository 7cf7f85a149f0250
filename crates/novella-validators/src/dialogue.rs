//! Dialogue subtext
//!
//! Quoted lines are sorted into exposition, thesis and subtext by lexical
//! cues. Anything that neither explains nor preaches counts as subtext.

use crate::context::ValidationContext;
use crate::violation::{count, ratio, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::text::{contains_phrase, dialogue_lines, words};
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// What a line of dialogue is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    Exposition,
    Thesis,
    Subtext,
}

/// Cues and ratio thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueSettings {
    pub min_subtext_ratio: f64,
    pub max_exposition_ratio: f64,
    pub max_thesis_ratio: f64,
    /// Lines longer than this many words read as exposition
    pub monologue_words: usize,
    pub exposition_cues: Vec<String>,
    pub thesis_cues: Vec<String>,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        let list = |ws: &[&str]| ws.iter().map(|w| (*w).to_string()).collect();
        Self {
            min_subtext_ratio: 0.6,
            max_exposition_ratio: 0.25,
            max_thesis_ratio: 0.1,
            monologue_words: 40,
            exposition_cues: list(&[
                "as you know", "remember when", "as we discussed", "let me explain",
                "the reason is", "years ago", "ever since", "i told you", "you see", "which means",
                "in other words",
            ]),
            thesis_cues: list(&[
                "life is", "love is", "the truth is", "meaning of", "people are", "humanity",
                "the world is", "we are all", "in the end", "what it means", "the point of",
                "human nature", "destiny",
            ]),
        }
    }
}

/// Rewards subtext and penalises explained or preached dialogue
#[derive(Debug, Clone, Default)]
pub struct DialogueValidator {
    settings: DialogueSettings,
}

impl DialogueValidator {
    /// Create with cues
    #[must_use]
    pub fn new(settings: DialogueSettings) -> Self {
        Self { settings }
    }

    /// Classify one quoted line
    #[must_use]
    pub fn classify(&self, line: &str) -> LineClass {
        let tokens = words(line);
        let s = &self.settings;
        if s.thesis_cues.iter().any(|c| contains_phrase(&tokens, c)) {
            LineClass::Thesis
        } else if tokens.len() > s.monologue_words
            || s.exposition_cues.iter().any(|c| contains_phrase(&tokens, c))
        {
            LineClass::Exposition
        } else {
            LineClass::Subtext
        }
    }

    fn penalty(&self, lines: usize, exposition: usize, thesis: usize) -> f64 {
        let s = &self.settings;
        let subtext = ratio(lines - exposition - thesis, lines);
        let excess = |value: f64, limit: f64| {
            if value <= limit || limit >= 1.0 {
                0.0
            } else {
                (value - limit) / (1.0 - limit)
            }
        };
        let shortfall = if s.min_subtext_ratio > 0.0 && subtext < s.min_subtext_ratio {
            (s.min_subtext_ratio - subtext) / s.min_subtext_ratio
        } else {
            0.0
        };
        0.5 * shortfall
            + 0.3 * excess(ratio(exposition, lines), s.max_exposition_ratio)
            + 0.2 * excess(ratio(thesis, lines), s.max_thesis_ratio)
    }
}

impl Validator for DialogueValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::DialogueSubtext
    }

    fn evaluate(&self, units: &[&Scene], _ctx: &ValidationContext<'_>) -> ValidatorResult {
        let s = &self.settings;
        let mut violations = Vec::new();
        let (mut lines, mut exposition, mut thesis) = (0, 0, 0);

        for scene in units {
            let classes: Vec<(LineClass, &str)> = dialogue_lines(scene.text())
                .into_iter()
                .map(|l| (self.classify(l), l))
                .collect();
            if classes.is_empty() {
                continue;
            }
            let n = classes.len();
            let e = classes.iter().filter(|(c, _)| *c == LineClass::Exposition).count();
            let t = classes.iter().filter(|(c, _)| *c == LineClass::Thesis).count();
            lines += n;
            exposition += e;
            thesis += t;

            let example = |class: LineClass| {
                classes
                    .iter()
                    .find(|(c, _)| *c == class)
                    .map(|(_, l)| *l)
                    .unwrap_or_default()
            };
            if ratio(e, n) > s.max_exposition_ratio {
                violations.push(
                    Violation::scored(
                        self.kind(),
                        format!("{e} of {n} lines are exposition, e.g. \"{}\"", example(LineClass::Exposition)),
                    )
                    .at_scene(scene.index),
                );
            }
            if ratio(t, n) > s.max_thesis_ratio {
                violations.push(
                    Violation::scored(
                        self.kind(),
                        format!("{t} of {n} lines state a thesis, e.g. \"{}\"", example(LineClass::Thesis)),
                    )
                    .at_scene(scene.index),
                );
            }
        }

        if lines == 0 {
            return ValidatorResult::new(self.kind()).with_metric("dialogue_lines", 0.0);
        }
        ValidatorResult::new(self.kind())
            .with_score(1.0 - self.penalty(lines, exposition, thesis))
            .with_metric("dialogue_lines", count(lines))
            .with_metric("subtext_ratio", ratio(lines - exposition - thesis, lines))
            .with_metric("exposition_ratio", ratio(exposition, lines))
            .with_metric("thesis_ratio", ratio(thesis, lines))
            .with_violations(violations)
    }
}
