//! Story bible entries
//!
//! Characters, plot threads and motifs as tracked across scenes.

use novella_scene::text::words;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Primary narrative role of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Protagonist,
    Antagonist,
    Ally,
    Minor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Protagonist => "protagonist",
            Self::Antagonist => "antagonist",
            Self::Ally => "ally",
            Self::Minor => "minor",
        };
        f.write_str(label)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "protagonist" => Ok(Self::Protagonist),
            "antagonist" => Ok(Self::Antagonist),
            "ally" => Ok(Self::Ally),
            "minor" => Ok(Self::Minor),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// An explicit, validated change of primary role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTransition {
    pub from: Role,
    pub to: Role,
    pub scene_index: usize,
}

/// A tracked character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterEntry {
    pub name: String,
    /// Current primary role
    pub role: Role,
    /// Role established on first appearance
    pub initial_role: Role,
    pub first_appearance: usize,
    pub last_appearance: usize,
    /// Other character name -> relationship label
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub transitions: Vec<RoleTransition>,
}

impl CharacterEntry {
    pub(crate) fn new(name: impl Into<String>, role: Role, scene_index: usize) -> Self {
        Self {
            name: name.into(),
            role,
            initial_role: role,
            first_appearance: scene_index,
            last_appearance: scene_index,
            relationships: BTreeMap::new(),
            transitions: Vec::new(),
        }
    }

    pub(crate) fn touch(&mut self, scene_index: usize) {
        self.first_appearance = self.first_appearance.min(scene_index);
        self.last_appearance = self.last_appearance.max(scene_index);
    }

    /// True when the current role is exactly the initial role carried through
    /// the recorded transitions, each starting where the previous one ended.
    #[must_use]
    pub fn lineage_is_consistent(&self) -> bool {
        let mut role = self.initial_role;
        for t in &self.transitions {
            if t.from != role {
                return false;
            }
            role = t.to;
        }
        role == self.role
    }
}

/// A narrative thread opened somewhere and expected to be carried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotThread {
    pub label: String,
    pub introduced_at: usize,
    pub last_referenced: usize,
    #[serde(default)]
    pub resolved: bool,
}

impl PlotThread {
    pub(crate) fn new(label: impl Into<String>, scene_index: usize) -> Self {
        Self {
            label: label.into(),
            introduced_at: scene_index,
            last_referenced: scene_index,
            resolved: false,
        }
    }

    /// Unresolved and unreferenced for more than `window` scenes
    #[inline]
    #[must_use]
    pub fn is_dropped(&self, current_scene: usize, window: usize) -> bool {
        !self.resolved && current_scene.saturating_sub(self.last_referenced) > window
    }
}

/// A recurring image or idea and how it manifests in each act
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motif {
    pub label: String,
    /// Act -> manifestation text; the latest manifestation per act wins
    #[serde(default)]
    pub manifestations: BTreeMap<u8, String>,
}

impl Motif {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            manifestations: BTreeMap::new(),
        }
    }

    /// Evolved when two acts carry manifestations further apart than
    /// `min_distance` (word-set Jaccard distance).
    #[must_use]
    pub fn is_evolved(&self, min_distance: f64) -> bool {
        let texts: Vec<&String> = self.manifestations.values().collect();
        for i in 0..texts.len() {
            for j in (i + 1)..texts.len() {
                if manifestation_distance(texts[i], texts[j]) > min_distance {
                    return true;
                }
            }
        }
        false
    }

    /// Number of acts with a manifestation
    #[inline]
    #[must_use]
    pub fn act_count(&self) -> usize {
        self.manifestations.len()
    }
}

/// Word-set Jaccard distance between two manifestation texts
#[must_use]
pub fn manifestation_distance(a: &str, b: &str) -> f64 {
    let wa: BTreeSet<String> = words(a).into_iter().collect();
    let wb: BTreeSet<String> = words(b).into_iter().collect();
    if wa.is_empty() && wb.is_empty() {
        return 0.0;
    }
    let shared = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    #[allow(clippy::cast_precision_loss)]
    let similarity = shared as f64 / union as f64;
    1.0 - similarity
}
