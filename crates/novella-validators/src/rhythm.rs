//! Rhythm and pacing
//!
//! Four prose metrics, each compared with a target band. A metric inside its
//! band scores 1; outside, the score falls linearly to 0 over the band's
//! tolerance.

use crate::context::ValidationContext;
use crate::violation::{count, ratio, ValidatorKind, ValidatorResult, Violation};
use crate::Validator;
use novella_scene::text::{sentences, word_count, words};
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// Acceptable range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
    /// Distance outside the band at which the metric scores 0
    pub tolerance: f64,
    pub weight: f64,
}

impl Band {
    /// Create band
    #[must_use]
    pub const fn new(min: f64, max: f64, tolerance: f64, weight: f64) -> Self {
        Self {
            min,
            max,
            tolerance,
            weight,
        }
    }

    /// How far `value` lies outside the band (0 inside)
    #[must_use]
    pub fn distance(&self, value: f64) -> f64 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }

    /// Score in [0, 1] for `value`
    #[must_use]
    pub fn score(&self, value: f64) -> f64 {
        let distance = self.distance(value);
        if distance <= 0.0 {
            return 1.0;
        }
        if self.tolerance <= 0.0 {
            return 0.0;
        }
        (1.0 - distance / self.tolerance).max(0.0)
    }
}

/// Bands and word lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmSettings {
    pub average_sentence_length: Band,
    pub short_sentence_ratio: Band,
    pub filter_verb_ratio: Band,
    pub filler_ratio: Band,
    /// Sentences with at most this many words count as short
    pub short_sentence_words: usize,
    pub filter_verbs: Vec<String>,
    pub fillers: Vec<String>,
}

impl Default for RhythmSettings {
    fn default() -> Self {
        let list = |ws: &[&str]| ws.iter().map(|w| (*w).to_string()).collect();
        Self {
            average_sentence_length: Band::new(18.0, 22.0, 10.0, 0.4),
            short_sentence_ratio: Band::new(0.1, 0.4, 0.3, 0.2),
            filter_verb_ratio: Band::new(0.0, 0.01, 0.03, 0.2),
            filler_ratio: Band::new(0.0, 0.01, 0.03, 0.2),
            short_sentence_words: 8,
            filter_verbs: list(&[
                "saw", "see", "sees", "seeing", "heard", "hear", "hears", "felt", "feel", "feels",
                "noticed", "notice", "watched", "realized", "wondered", "thought", "seemed",
                "looked", "knew", "decided",
            ]),
            fillers: list(&[
                "very", "really", "just", "quite", "rather", "somewhat", "actually", "basically",
                "literally", "simply", "totally", "pretty", "extremely", "truly",
            ]),
        }
    }
}

/// Raw counts behind the metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    sentences: usize,
    sentence_words: usize,
    short: usize,
    words: usize,
    filter: usize,
    filler: usize,
}

impl Counts {
    fn add(&mut self, other: Self) {
        self.sentences += other.sentences;
        self.sentence_words += other.sentence_words;
        self.short += other.short;
        self.words += other.words;
        self.filter += other.filter;
        self.filler += other.filler;
    }
}

/// Scores sentence length and word-choice ratios against target bands
#[derive(Debug, Clone, Default)]
pub struct RhythmValidator {
    settings: RhythmSettings,
}

impl RhythmValidator {
    /// Create with bands
    #[must_use]
    pub fn new(settings: RhythmSettings) -> Self {
        Self { settings }
    }

    fn counts(&self, text: &str) -> Counts {
        let s = &self.settings;
        let mut c = Counts::default();
        for sentence in sentences(text) {
            let n = word_count(sentence);
            c.sentences += 1;
            c.sentence_words += n;
            if n <= s.short_sentence_words {
                c.short += 1;
            }
        }
        let tokens = words(text);
        c.words = tokens.len();
        c.filter = tokens.iter().filter(|w| s.filter_verbs.contains(w)).count();
        c.filler = tokens.iter().filter(|w| s.fillers.contains(w)).count();
        c
    }

    /// (name, value, band) for each metric
    fn metrics(&self, c: Counts) -> [(&'static str, f64, Band); 4] {
        let s = &self.settings;
        [
            (
                "average_sentence_length",
                ratio(c.sentence_words, c.sentences),
                s.average_sentence_length,
            ),
            (
                "short_sentence_ratio",
                ratio(c.short, c.sentences),
                s.short_sentence_ratio,
            ),
            ("filter_verb_ratio", ratio(c.filter, c.words), s.filter_verb_ratio),
            ("filler_ratio", ratio(c.filler, c.words), s.filler_ratio),
        ]
    }

    fn weighted(metrics: &[(&'static str, f64, Band); 4]) -> f64 {
        let total: f64 = metrics.iter().map(|(_, _, b)| b.weight.max(0.0)).sum();
        if total <= 0.0 {
            return 1.0;
        }
        metrics
            .iter()
            .map(|(_, v, b)| b.weight.max(0.0) * b.score(*v))
            .sum::<f64>()
            / total
    }
}

impl Validator for RhythmValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Rhythm
    }

    fn evaluate(&self, units: &[&Scene], _ctx: &ValidationContext<'_>) -> ValidatorResult {
        let mut violations = Vec::new();
        let mut scores = Vec::with_capacity(units.len());
        let mut total = Counts::default();

        for scene in units {
            let c = self.counts(scene.text());
            total.add(c);
            if c.sentences == 0 {
                continue;
            }
            let metrics = self.metrics(c);
            scores.push(Self::weighted(&metrics));
            for (name, value, band) in &metrics {
                if band.distance(*value) > 0.0 {
                    violations.push(
                        Violation::scored(
                            self.kind(),
                            format!(
                                "{name} {value:.3} outside target band {:.3}..{:.3}",
                                band.min, band.max
                            ),
                        )
                        .at_scene(scene.index),
                    );
                }
            }
        }

        let score = if scores.is_empty() {
            1.0
        } else {
            scores.iter().sum::<f64>() / count(scores.len())
        };
        let mut result = ValidatorResult::new(self.kind())
            .with_score(score)
            .with_metric("sentences", count(total.sentences));
        for (name, value, _) in self.metrics(total) {
            result = result.with_metric(name, value);
        }
        result.with_violations(violations)
    }
}
