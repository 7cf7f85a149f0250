//! Scenes and their revision history
//!
//! A [`Scene`] is the unit of generated prose. Drafting creates it, polish
//! stages add revisions; earlier revisions are kept so stage attempts can be
//! diffed, and a scene is never removed from a project.

use crate::fingerprint::Fingerprint;
use crate::hash::ContentHash;
use crate::text::{word_count, words};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Narrating person declared for a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointOfView {
    /// "I walked in."
    First,
    /// "You walk in."
    Second,
    /// "She walked in."
    #[default]
    Third,
}

impl fmt::Display for PointOfView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::First => "first",
            Self::Second => "second",
            Self::Third => "third",
        };
        f.write_str(label)
    }
}

impl FromStr for PointOfView {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "1st" | "first_person" => Ok(Self::First),
            "second" | "2nd" | "second_person" => Ok(Self::Second),
            "third" | "3rd" | "third_person" => Ok(Self::Third),
            other => Err(SceneError::UnknownPointOfView(other.to_string())),
        }
    }
}

/// Presence flags for the structural elements of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralTags {
    pub goal: bool,
    pub conflict: bool,
    pub turn: bool,
    pub hook: bool,
    pub inciting_incident: bool,
}

impl StructuralTags {
    /// Number of the four core elements present (goal, conflict, turn, hook)
    #[inline]
    #[must_use]
    pub fn core_count(&self) -> usize {
        [self.goal, self.conflict, self.turn, self.hook]
            .iter()
            .filter(|present| **present)
            .count()
    }
}

/// One version of a scene's prose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRevision {
    /// 0 for the draft, incremented per revision
    pub revision: u32,
    /// Stage that produced this text
    pub stage: String,
    pub text: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub content_hash: ContentHash,
}

impl SceneRevision {
    fn new(revision: u32, stage: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            revision,
            stage: stage.into(),
            word_count: word_count(&text),
            content_hash: ContentHash::of_text(&text),
            text,
        }
    }
}

/// Word-level change between two revisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionDiff {
    pub from_revision: u32,
    pub to_revision: u32,
    pub words_added: usize,
    pub words_removed: usize,
    /// Shingle similarity of the two texts
    pub similarity: f64,
}

/// Unit of generated content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Position in the manuscript, 0-based
    pub index: usize,
    #[serde(default = "default_chapter")]
    pub chapter: u32,
    #[serde(default = "default_act")]
    pub act: u8,
    #[serde(default)]
    pub pov: PointOfView,
    /// Story beats the drafting stage placed in this scene
    #[serde(default)]
    pub beats: BTreeSet<String>,
    /// Paragraph indices flagged as intentional frame breaks
    #[serde(default)]
    pub frame_breaks: BTreeSet<usize>,
    #[serde(default)]
    pub tags: StructuralTags,
    current: SceneRevision,
    #[serde(default)]
    superseded: Vec<SceneRevision>,
}

fn default_chapter() -> u32 {
    1
}

fn default_act() -> u8 {
    1
}

impl Scene {
    /// Create a drafted scene (revision 0)
    #[must_use]
    pub fn new(
        index: usize,
        chapter: u32,
        act: u8,
        pov: PointOfView,
        stage: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            index,
            chapter,
            act,
            pov,
            beats: BTreeSet::new(),
            frame_breaks: BTreeSet::new(),
            tags: StructuralTags::default(),
            current: SceneRevision::new(0, stage, text),
            superseded: Vec::new(),
        }
    }

    /// With declared story beats
    #[must_use]
    pub fn with_beats<I, S>(mut self, beats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.beats = beats.into_iter().map(Into::into).collect();
        self
    }

    /// With intentional frame-break paragraphs
    #[must_use]
    pub fn with_frame_breaks(mut self, paragraphs: impl IntoIterator<Item = usize>) -> Self {
        self.frame_breaks = paragraphs.into_iter().collect();
        self
    }

    /// Current prose
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.current.text
    }

    /// Word count of the current revision
    #[inline]
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.current.word_count
    }

    /// Hash of the current revision
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        self.current.content_hash
    }

    /// Current revision
    #[inline]
    #[must_use]
    pub fn current(&self) -> &SceneRevision {
        &self.current
    }

    /// Stage that produced the current text
    #[inline]
    #[must_use]
    pub fn origin_stage(&self) -> &str {
        &self.current.stage
    }

    /// All revisions, oldest first, current last
    pub fn revisions(&self) -> impl Iterator<Item = &SceneRevision> {
        self.superseded.iter().chain(std::iter::once(&self.current))
    }

    /// Look up a revision by number
    #[must_use]
    pub fn revision(&self, revision: u32) -> Option<&SceneRevision> {
        self.revisions().find(|r| r.revision == revision)
    }

    /// Number of revisions including the current one
    #[inline]
    #[must_use]
    pub fn revision_count(&self) -> usize {
        self.superseded.len() + 1
    }

    /// Replace the prose with a new revision produced by `stage`.
    ///
    /// Returns `false` (and records nothing) when the normalized text is
    /// unchanged.
    pub fn revise(&mut self, stage: impl Into<String>, text: impl Into<String>) -> bool {
        let next = SceneRevision::new(self.current.revision + 1, stage, text);
        if next.content_hash == self.current.content_hash {
            return false;
        }
        let previous = std::mem::replace(&mut self.current, next);
        self.superseded.push(previous);
        true
    }

    /// Whether paragraph `paragraph` is an intentional frame break
    #[inline]
    #[must_use]
    pub fn is_frame_break(&self, paragraph: usize) -> bool {
        self.frame_breaks.contains(&paragraph)
    }

    /// Shingle fingerprint of the current text
    #[inline]
    #[must_use]
    pub fn fingerprint(&self, shingle_size: usize) -> Fingerprint {
        Fingerprint::of(&self.current.text, shingle_size)
    }

    /// Word-level diff between two retained revisions
    #[must_use]
    pub fn diff(&self, from: u32, to: u32) -> Option<RevisionDiff> {
        let a = self.revision(from)?;
        let b = self.revision(to)?;

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for w in words(&a.text) {
            *counts.entry(w).or_default() -= 1;
        }
        for w in words(&b.text) {
            *counts.entry(w).or_default() += 1;
        }
        let added: i64 = counts.values().filter(|c| **c > 0).sum();
        let removed: i64 = counts.values().filter(|c| **c < 0).map(|c| -c).sum();

        Some(RevisionDiff {
            from_revision: from,
            to_revision: to,
            words_added: usize::try_from(added).unwrap_or_default(),
            words_removed: usize::try_from(removed).unwrap_or_default(),
            similarity: Fingerprint::of(&a.text, 3).similarity(&Fingerprint::of(&b.text, 3)),
        })
    }
}

/// Errors for scene construction from loosely typed input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// POV label not recognised
    #[error("unknown point of view: {0}")]
    UnknownPointOfView(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Scene {
        Scene::new(0, 1, 1, PointOfView::First, "draft", "I opened the door. The hall was dark.")
    }

    #[test]
    fn new_scene_is_revision_zero() {
        let scene = draft();
        assert_eq!(scene.current().revision, 0);
        assert_eq!(scene.word_count(), 8);
        assert_eq!(scene.origin_stage(), "draft");
        assert_eq!(scene.revision_count(), 1);
    }

    #[test]
    fn revise_retains_history() {
        let mut scene = draft();
        assert!(scene.revise("polish", "I opened the heavy door. The hall was black."));
        assert_eq!(scene.revision_count(), 2);
        assert_eq!(scene.current().revision, 1);
        assert_eq!(scene.origin_stage(), "polish");
        assert_eq!(scene.revision(0).unwrap().stage, "draft");
    }

    #[test]
    fn revise_with_same_text_is_a_no_op() {
        let mut scene = draft();
        assert!(!scene.revise("polish", "I opened the door.\n\nThe hall was dark."));
        assert_eq!(scene.revision_count(), 1);
    }

    #[test]
    fn diff_counts_word_changes() {
        let mut scene = draft();
        scene.revise("polish", "I opened the heavy door. The hall was black.");
        let diff = scene.diff(0, 1).unwrap();
        assert_eq!(diff.words_added, 2);
        assert_eq!(diff.words_removed, 1);
        assert!(diff.similarity < 1.0);
        assert!(scene.diff(0, 7).is_none());
    }

    #[test]
    fn pov_parses_common_labels() {
        assert_eq!("First".parse::<PointOfView>().unwrap(), PointOfView::First);
        assert_eq!("3rd".parse::<PointOfView>().unwrap(), PointOfView::Third);
        assert!("omniscient".parse::<PointOfView>().is_err());
    }

    #[test]
    fn scene_survives_json_with_missing_fields() {
        let json = r#"{
            "index": 4,
            "current": {"revision": 0, "stage": "draft", "text": "Hello there."},
            "unknown_future_field": true
        }"#;
        let scene: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(scene.index, 4);
        assert_eq!(scene.chapter, 1);
        assert_eq!(scene.pov, PointOfView::Third);
        assert!(scene.beats.is_empty());
    }

    #[test]
    fn structural_core_count() {
        let tags = StructuralTags {
            goal: true,
            hook: true,
            ..StructuralTags::default()
        };
        assert_eq!(tags.core_count(), 2);
    }
}
