//! Prose repetition and cliché linting
//!
//! Project-scoped: every scene of the project is scanned, not only the
//! stage's units, and the shared n-gram corpus supplies cross-scene counts.

use crate::context::ValidationContext;
use crate::violation::{count, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::text::{contains_phrase, count_phrase, words};
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// A phrase allowed at most `cap` times in the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedPhrase {
    pub phrase: String,
    #[serde(default = "default_cap")]
    pub cap: usize,
}

fn default_cap() -> usize {
    1
}

impl BannedPhrase {
    /// Create entry
    #[must_use]
    pub fn new(phrase: impl Into<String>, cap: usize) -> Self {
        Self {
            phrase: phrase.into(),
            cap,
        }
    }
}

/// Blocklists and ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepetitionSettings {
    pub banned: Vec<BannedPhrase>,
    /// Any occurrence blocks the stage unless part of a motif label
    pub zero_tolerance: Vec<String>,
    /// Maximum occurrences of one n-gram across the project
    pub ngram_ceiling: u32,
    pub penalty_per_excess_hit: f64,
    pub penalty_per_ngram: f64,
    /// Report at most this many over-ceiling n-grams
    pub max_ngram_reports: usize,
}

impl Default for RepetitionSettings {
    fn default() -> Self {
        let banned = [
            "heart skipped a beat",
            "let out a breath she didn't know she was holding",
            "a shiver ran down",
            "time stood still",
            "eyes widened",
            "in the nick of time",
            "all hell broke loose",
            "calm before the storm",
        ]
        .into_iter()
        .map(|p| BannedPhrase::new(p, 1))
        .collect();
        Self {
            banned,
            zero_tolerance: vec![
                "it was all a dream".to_string(),
                "little did she know".to_string(),
                "little did he know".to_string(),
            ],
            ngram_ceiling: 8,
            penalty_per_excess_hit: 0.1,
            penalty_per_ngram: 0.05,
            max_ngram_reports: 10,
        }
    }
}

/// Penalises banned phrases beyond their caps and overused n-grams
#[derive(Debug, Clone, Default)]
pub struct RepetitionValidator {
    settings: RepetitionSettings,
}

impl RepetitionValidator {
    /// Create with lists
    #[must_use]
    pub fn new(settings: RepetitionSettings) -> Self {
        Self { settings }
    }

    fn exempt_by_motif(phrase: &str, ctx: &ValidationContext<'_>) -> bool {
        let needle = words(phrase);
        ctx.registry.motifs().any(|m| {
            let label = words(&m.label);
            contains_phrase(&label, phrase)
                || (!label.is_empty() && contains_phrase(&needle, &m.label))
        })
    }
}

impl Validator for RepetitionValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Repetition
    }

    fn evaluate(&self, _units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult {
        let s = &self.settings;
        let tokenized: Vec<(usize, Vec<String>)> =
            ctx.scenes.iter().map(|sc| (sc.index, words(sc.text()))).collect();
        let mut violations = Vec::new();
        let mut banned_hits = 0;
        let mut excess_hits = 0;

        for banned in &s.banned {
            let mut seen = 0;
            let mut first_excess = None;
            for (index, tokens) in &tokenized {
                let hits = count_phrase(tokens, &banned.phrase);
                if hits > 0 && seen + hits > banned.cap && first_excess.is_none() {
                    first_excess = Some(*index);
                }
                seen += hits;
            }
            banned_hits += seen;
            if let Some(scene_index) = first_excess {
                let excess = seen - banned.cap;
                excess_hits += excess;
                violations.push(
                    Violation::scored(
                        self.kind(),
                        format!(
                            "'{}' used {seen} times (cap {})",
                            banned.phrase, banned.cap
                        ),
                    )
                    .at_scene(scene_index),
                );
            }
        }

        let mut zero_tolerance_hits = 0;
        for phrase in &s.zero_tolerance {
            if Self::exempt_by_motif(phrase, ctx) {
                continue;
            }
            for (index, tokens) in &tokenized {
                if contains_phrase(tokens, phrase) {
                    zero_tolerance_hits += 1;
                    violations.push(
                        Violation::blocking(self.kind(), format!("zero-tolerance phrase '{phrase}'"))
                            .at_scene(*index),
                    );
                }
            }
        }

        let over = ctx.corpus.over_ceiling(s.ngram_ceiling);
        for (gram, freq) in over.iter().take(s.max_ngram_reports) {
            let mut v = Violation::scored(
                self.kind(),
                format!(
                    "'{gram}' occurs {freq} times across the project (ceiling {})",
                    s.ngram_ceiling
                ),
            );
            if let Some(scene) = ctx.corpus.top_contributor(gram) {
                v = v.at_scene(scene);
            }
            violations.push(v);
        }

        let penalty =
            count(excess_hits) * s.penalty_per_excess_hit + count(over.len()) * s.penalty_per_ngram;
        ValidatorResult::new(self.kind())
            .with_score(1.0 - penalty)
            .with_metric("banned_hits", count(banned_hits))
            .with_metric("excess_hits", count(excess_hits))
            .with_metric("ngrams_over_ceiling", count(over.len()))
            .with_metric("zero_tolerance_hits", count(zero_tolerance_hits))
            .with_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use novella_scene::PointOfView;

    fn scene(index: usize, text: &str) -> Scene {
        Scene::new(index, 1, 1, PointOfView::Third, "draft", text)
    }

    #[test]
    fn banned_phrase_within_cap_is_fine() {
        let fx = Fixture::new(vec![scene(0, "Her heart skipped a beat.")]);
        let result = RepetitionValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!((result.metrics["banned_hits"] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cap_is_project_wide() {
        let fx = Fixture::new(vec![
            scene(0, "Her heart skipped a beat."),
            scene(1, "Rain."),
            scene(2, "His heart skipped a beat too."),
        ]);
        let result = RepetitionValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!((result.score - 0.9).abs() < 1e-9);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].scene_index, Some(2));
    }

    #[test]
    fn zero_tolerance_blocks() {
        let fx = Fixture::new(vec![scene(3, "Little did she know, the door was open.")]);
        let result = RepetitionValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(result.has_blocking());
        assert_eq!(result.violations[0].scene_index, Some(3));
    }

    #[test]
    fn motif_label_exempts_zero_tolerance() {
        let mut fx = Fixture::new(vec![scene(0, "She woke. It was all a dream, again.")]);
        fx.registry.record_manifestation("it was all a dream", 1, "waking in the attic");
        let result = RepetitionValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(!result.has_blocking());
    }

    #[test]
    fn overused_ngram_is_penalised() {
        let text = "cold iron gate ".repeat(10);
        let fx = Fixture::new(vec![scene(0, &text)]);
        let result = RepetitionValidator::default().evaluate(&fx.units(), &fx.ctx());
        assert!(result.score < 1.0);
        assert!(result.metrics["ngrams_over_ceiling"] >= 1.0);
    }
}
