//! Content hashing for scene revisions
//!
//! Provides [`ContentHash`], a 32-byte Blake3 digest of normalized scene text.
//! Two revisions whose prose differs only in whitespace layout hash equal.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content hash (Blake3)
///
/// Identifies a revision's text. Immutable and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash prose after collapsing every whitespace run to a single space
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        let mut first = true;
        for token in text.split_whitespace() {
            if !first {
                hasher.update(b" ");
            }
            hasher.update(token.as_bytes());
            first = false;
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Check if hash is all zeros (uninitialized)
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// Snapshots are JSON, so the hash always travels as a hex string
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_layout_does_not_change_hash() {
        let a = ContentHash::of_text("The rain  fell.\n\nShe ran.");
        let b = ContentHash::of_text("The rain fell. She ran.");
        assert_eq!(a, b);
    }

    #[test]
    fn different_words_change_hash() {
        let a = ContentHash::of_text("The rain fell.");
        let b = ContentHash::of_text("The snow fell.");
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_parse() {
        let hash = ContentHash::compute(b"scene");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let result = "abcd".parse::<ContentHash>();
        assert!(matches!(
            result,
            Err(HashError::InvalidLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn serde_json_uses_hex_string() {
        let hash = ContentHash::compute(b"scene");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json.len(), 66);
        let decoded: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, decoded);
    }

    #[test]
    fn default_is_zero() {
        assert!(ContentHash::default().is_zero());
        assert!(!ContentHash::compute(b"x").is_zero());
    }
}
