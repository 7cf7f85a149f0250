//! Shingle fingerprints for near-duplicate detection
//!
//! A fingerprint is the set of hashed word k-grams ("shingles") of a text.
//! Similarity between two fingerprints is their Jaccard index.

use crate::text::words;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of words per shingle
pub const DEFAULT_SHINGLE_SIZE: usize = 5;

/// Set of hashed word shingles
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    shingle_size: usize,
    shingles: BTreeSet<u64>,
}

impl Fingerprint {
    /// Fingerprint `text` with `shingle_size`-word shingles.
    ///
    /// Texts shorter than one shingle produce a single shingle of all their
    /// words, so very short scenes still compare meaningfully.
    #[must_use]
    pub fn of(text: &str, shingle_size: usize) -> Self {
        let shingle_size = shingle_size.max(1);
        let tokens = words(text);
        let mut shingles = BTreeSet::new();

        if tokens.is_empty() {
            return Self {
                shingle_size,
                shingles,
            };
        }

        if tokens.len() < shingle_size {
            shingles.insert(hash_shingle(&tokens));
        } else {
            for window in tokens.windows(shingle_size) {
                shingles.insert(hash_shingle(window));
            }
        }

        Self {
            shingle_size,
            shingles,
        }
    }

    /// Number of distinct shingles
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shingles.len()
    }

    /// True for texts without words
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shingles.is_empty()
    }

    /// Words per shingle
    #[inline]
    #[must_use]
    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    /// Jaccard similarity in [0, 1]; 0 when either side is empty
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let shared = self.shingles.intersection(&other.shingles).count();
        let union = self.shingles.len() + other.shingles.len() - shared;
        #[allow(clippy::cast_precision_loss)]
        let ratio = shared as f64 / union as f64;
        ratio
    }
}

fn hash_shingle(window: &[String]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for (i, w) in window.iter().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(w.as_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
