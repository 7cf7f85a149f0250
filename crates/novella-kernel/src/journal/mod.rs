//! Hash-chained journal of stage events
//!
//! Every entry commits to its predecessor's hash, so a persisted journal can
//! be checked for tampering or truncation in the middle.

use crate::error::JournalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    StageStarted,
    AttemptFinished,
    RepairEntered,
    Resumed,
    TierDowngraded,
    Cancelled,
    Aborted,
    Completed,
}

impl JournalEvent {
    /// Stable label used in hashing
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StageStarted => "stage_started",
            Self::AttemptFinished => "attempt_finished",
            Self::RepairEntered => "repair_entered",
            Self::Resumed => "resumed",
            Self::TierDowngraded => "tier_downgraded",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for JournalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub attempt: u32,
    pub event: JournalEvent,
    pub detail: String,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl JournalEntry {
    /// Hex form of the entry hash
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Append-only stage journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageJournal {
    entries: Vec<JournalEntry>,
}

impl StageJournal {
    /// Create empty journal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number
    pub fn append(
        &mut self,
        stage: impl Into<String>,
        attempt: u32,
        event: JournalEvent,
        detail: impl Into<String>,
    ) -> u64 {
        let (sequence, prev_hash) = self
            .entries
            .last()
            .map_or((0, [0u8; 32]), |e| (e.sequence + 1, e.hash));

        let mut entry = JournalEntry {
            sequence,
            timestamp: Utc::now(),
            stage: stage.into(),
            attempt,
            event,
            detail: detail.into(),
            prev_hash,
            hash: [0u8; 32],
        };
        entry.hash = compute_hash(&entry);
        tracing::debug!(
            sequence,
            stage = %entry.stage,
            attempt,
            event = %event,
            "Journal entry appended"
        );
        self.entries.push(entry);
        sequence
    }

    /// All entries, oldest first
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Most recent entry
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&JournalEntry> {
        self.entries.last()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no event was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the chain.
    ///
    /// # Errors
    /// `JournalError::IntegrityViolation` naming the first bad entry.
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        let mut prev = [0u8; 32];
        for e in &self.entries {
            if e.prev_hash != prev || e.hash != compute_hash(e) {
                return Err(JournalError::IntegrityViolation {
                    sequence: e.sequence,
                });
            }
            prev = e.hash;
        }
        Ok(())
    }
}

fn compute_hash(entry: &JournalEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.sequence.to_le_bytes());
    hasher.update(entry.timestamp.timestamp_micros().to_le_bytes());
    hasher.update(entry.stage.as_bytes());
    hasher.update([0]);
    hasher.update(entry.attempt.to_le_bytes());
    hasher.update(entry.event.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(entry.detail.as_bytes());
    hasher.update([0]);
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}
