//! Project-wide n-gram frequency table
//!
//! Each scene contributes the n-grams of its current text. Revising a scene
//! replaces its contribution, so the table always reflects current prose.

use novella_scene::text::words;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default words per n-gram
pub const DEFAULT_NGRAM_SIZE: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "by",
    "from", "as", "is", "was", "were", "be", "been", "it", "its", "that", "this", "i", "you",
    "he", "she", "we", "they", "me", "him", "her", "us", "them", "my", "his", "their", "our",
    "your", "had", "have", "has", "did", "do", "not", "no", "so", "then", "there", "if",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Corpus-wide n-gram counts with per-scene contributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NgramCorpus {
    n: usize,
    totals: BTreeMap<String, u32>,
    by_scene: BTreeMap<usize, BTreeMap<String, u32>>,
}

impl Default for NgramCorpus {
    fn default() -> Self {
        Self::new(DEFAULT_NGRAM_SIZE)
    }
}

impl NgramCorpus {
    /// Empty corpus of `n`-word grams
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            n: n.max(1),
            totals: BTreeMap::new(),
            by_scene: BTreeMap::new(),
        }
    }

    /// Words per n-gram
    #[inline]
    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Set the contribution of scene `index` to the n-grams of `text`,
    /// replacing whatever it contributed before
    pub fn upsert_scene(&mut self, index: usize, text: &str) {
        self.remove_scene(index);
        let grams = ngrams(text, self.n);
        for (gram, count) in &grams {
            *self.totals.entry(gram.clone()).or_default() += count;
        }
        if !grams.is_empty() {
            self.by_scene.insert(index, grams);
        }
    }

    /// Drop the contribution of scene `index`
    pub fn remove_scene(&mut self, index: usize) {
        let Some(previous) = self.by_scene.remove(&index) else {
            return;
        };
        for (gram, count) in previous {
            if let Some(total) = self.totals.get_mut(&gram) {
                *total = total.saturating_sub(count);
                if *total == 0 {
                    self.totals.remove(&gram);
                }
            }
        }
    }

    /// Occurrences of `gram` (space-joined lowercase words) across the project
    #[must_use]
    pub fn frequency(&self, gram: &str) -> u32 {
        self.totals.get(gram).copied().unwrap_or_default()
    }

    /// N-grams occurring more than `ceiling` times, most frequent first.
    ///
    /// Grams made only of stopwords are ignored.
    #[must_use]
    pub fn over_ceiling(&self, ceiling: u32) -> Vec<(&str, u32)> {
        let mut hits: Vec<(&str, u32)> = self
            .totals
            .iter()
            .filter(|(gram, count)| **count > ceiling && !gram.split(' ').all(is_stopword))
            .map(|(gram, count)| (gram.as_str(), *count))
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        hits
    }

    /// Scene contributing most occurrences of `gram` (lowest index on ties)
    #[must_use]
    pub fn top_contributor(&self, gram: &str) -> Option<usize> {
        self.by_scene
            .iter()
            .filter_map(|(index, grams)| grams.get(gram).map(|c| (*index, *c)))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(index, _)| index)
    }

    /// Number of scenes contributing
    #[inline]
    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.by_scene.len()
    }

    /// Number of distinct n-grams
    #[inline]
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.totals.len()
    }
}

fn ngrams(text: &str, n: usize) -> BTreeMap<String, u32> {
    let tokens = words(text);
    let mut grams = BTreeMap::new();
    if tokens.len() < n {
        return grams;
    }
    for window in tokens.windows(n) {
        *grams.entry(window.join(" ")).or_default() += 1;
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_across_scenes() {
        let mut corpus = NgramCorpus::new(3);
        corpus.upsert_scene(0, "Her breath caught in her throat.");
        corpus.upsert_scene(1, "Again her breath caught.");
        assert_eq!(corpus.frequency("her breath caught"), 2);
        assert_eq!(corpus.scene_count(), 2);
    }

    #[test]
    fn upsert_replaces_previous_contribution() {
        let mut corpus = NgramCorpus::new(3);
        corpus.upsert_scene(0, "Her breath caught in her throat.");
        corpus.upsert_scene(0, "She laughed at the storm.");
        assert_eq!(corpus.frequency("her breath caught"), 0);
        assert_eq!(corpus.frequency("laughed at the"), 1);
    }

    #[test]
    fn ceiling_ignores_stopword_grams() {
        let mut corpus = NgramCorpus::new(3);
        corpus.upsert_scene(0, "and then there and then there and then there");
        corpus.upsert_scene(1, "cold iron gate cold iron gate cold iron gate");
        let over = corpus.over_ceiling(2);
        assert_eq!(over, vec![("cold iron gate", 3)]);
        assert_eq!(corpus.top_contributor("cold iron gate"), Some(1));
    }

    #[test]
    fn short_text_contributes_nothing() {
        let mut corpus = NgramCorpus::new(3);
        corpus.upsert_scene(4, "Run.");
        assert_eq!(corpus.scene_count(), 0);
        assert_eq!(corpus.distinct(), 0);
    }
}
