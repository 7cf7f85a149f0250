//! Read-only inputs shared by every validator

use crate::corpus::NgramCorpus;
use novella_bible::{ContinuityViolation, EntityRegistry};
use novella_scene::Scene;
use serde::{Deserialize, Serialize};

/// Expected position of a story beat, as fractions of planned length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatWindow {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

impl BeatWindow {
    /// Create window
    #[must_use]
    pub fn new(name: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

/// Planned macro structure of the manuscript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryShape {
    /// Total number of scenes the plan calls for
    pub planned_scenes: usize,
    /// Fractions where acts 2, 3, ... begin, ascending
    pub act_boundaries: Vec<f64>,
    pub beats: Vec<BeatWindow>,
}

impl Default for StoryShape {
    fn default() -> Self {
        Self {
            planned_scenes: 0,
            act_boundaries: vec![0.25, 0.75],
            beats: vec![
                BeatWindow::new("inciting incident", 0.08, 0.12),
                BeatWindow::new("first plot point", 0.20, 0.30),
                BeatWindow::new("midpoint", 0.45, 0.55),
                BeatWindow::new("climax", 0.85, 0.95),
            ],
        }
    }
}

impl StoryShape {
    /// Shape for `planned_scenes` with the default three-act layout
    #[must_use]
    pub fn with_planned_scenes(planned_scenes: usize) -> Self {
        Self {
            planned_scenes,
            ..Self::default()
        }
    }

    /// Relative position of scene `index` (its midpoint), if a plan exists
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self, index: usize) -> Option<f64> {
        if self.planned_scenes == 0 {
            return None;
        }
        Some((index as f64 + 0.5) / self.planned_scenes as f64)
    }

    /// Act (1-based) a position falls into
    #[must_use]
    pub fn act_at(&self, position: f64) -> u8 {
        let crossed = self
            .act_boundaries
            .iter()
            .filter(|b| position >= **b)
            .count();
        u8::try_from(crossed + 1).unwrap_or(u8::MAX)
    }

    /// Act a scene index is planned for, if a plan exists
    #[must_use]
    pub fn planned_act(&self, index: usize) -> Option<u8> {
        self.position(index).map(|p| self.act_at(p))
    }
}

/// A unit the generation collaborator could not produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub scene_index: usize,
    pub reason: String,
    /// Transient failure that outlived its retries; otherwise a refusal
    #[serde(default)]
    pub retryable: bool,
}

impl UnitFailure {
    /// Generation refused the unit; it cannot be regenerated automatically
    #[must_use]
    pub fn refused(scene_index: usize, reason: impl Into<String>) -> Self {
        Self {
            scene_index,
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Generation kept failing transiently
    #[must_use]
    pub fn exhausted(scene_index: usize, reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::refused(scene_index, reason)
        }
    }
}

/// Everything a validator may read.
///
/// Holds shared references only; validators cannot mutate project state.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Every scene of the project, ordered by index
    pub scenes: &'a [Scene],
    pub registry: &'a EntityRegistry,
    pub corpus: &'a NgramCorpus,
    pub shape: &'a StoryShape,
    /// Continuity violations raised while applying this stage's outputs
    pub continuity: &'a [ContinuityViolation],
    /// Units generation could not produce in this stage
    pub failures: &'a [UnitFailure],
    /// Scene index the story has reached (for the dropped-thread sweep)
    pub current_scene_index: usize,
}

impl<'a> ValidationContext<'a> {
    /// Context with no continuity findings or failures
    #[must_use]
    pub fn new(
        scenes: &'a [Scene],
        registry: &'a EntityRegistry,
        corpus: &'a NgramCorpus,
        shape: &'a StoryShape,
    ) -> Self {
        let current_scene_index = scenes.iter().map(|s| s.index).max().unwrap_or_default();
        Self {
            scenes,
            registry,
            corpus,
            shape,
            continuity: &[],
            failures: &[],
            current_scene_index,
        }
    }

    /// With this stage's continuity violations
    #[must_use]
    pub fn with_continuity(mut self, continuity: &'a [ContinuityViolation]) -> Self {
        self.continuity = continuity;
        self
    }

    /// With refused units
    #[must_use]
    pub fn with_failures(mut self, failures: &'a [UnitFailure]) -> Self {
        self.failures = failures;
        self
    }

    /// Override the scene the story has reached
    #[must_use]
    pub fn with_current_scene(mut self, index: usize) -> Self {
        self.current_scene_index = index;
        self
    }

    /// Scene by index
    #[must_use]
    pub fn scene(&self, index: usize) -> Option<&'a Scene> {
        self.scenes.iter().find(|s| s.index == index)
    }
}
