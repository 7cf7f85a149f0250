//! Novella Validators
//!
//! Side-effect-free checks over generated scenes and the story bible.
//!
//! # Core Concepts
//!
//! - [`Validator`]: `evaluate(units, context) -> ValidatorResult`, pure and infallible
//! - [`ValidationContext`]: Read-only view of scenes, registry, corpus and plan
//! - [`Violation`]: Finding with severity, scene and paragraph
//! - [`NgramCorpus`]: Project-wide n-gram counts for the repetition linter
//!
//! Validators never return errors; every issue becomes a [`Violation`] so the
//! quality gate can decide pass or fail as a whole.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod act_timing;
pub mod continuity;
pub mod dialogue;
pub mod duplication;
pub mod motif;
pub mod pov;
pub mod repetition;
pub mod rhythm;
pub mod structure;

mod context;
mod corpus;
mod settings;
mod violation;

pub use context::{BeatWindow, StoryShape, UnitFailure, ValidationContext};
pub use corpus::{NgramCorpus, DEFAULT_NGRAM_SIZE};
pub use duplication::MAX_DUPLICATE_THRESHOLD;
pub use settings::ValidatorSettings;
pub use violation::{Severity, ValidatorKind, ValidatorResult, Violation};

use novella_scene::Scene;

/// A pure check over a set of units.
///
/// Implementations must be deterministic: the same units and context always
/// produce an equal result.
pub trait Validator: Send + Sync {
    /// Which validator this is
    fn kind(&self) -> ValidatorKind;

    /// Score `units` (the scenes a stage produced or touched) in `ctx`
    fn evaluate(&self, units: &[&Scene], ctx: &ValidationContext<'_>) -> ValidatorResult;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
