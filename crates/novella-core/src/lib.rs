//! Novella Core
//!
//! Pipeline orchestrator for stage-sequenced narrative generation.
//!
//! # Core Concepts
//!
//! - [`Orchestrator`]: Runs stages in order, gates every attempt, repairs and resumes
//! - [`NarrativeProject`]: Single-writer aggregate of scenes, story bible, budget and journal
//! - [`Generator`]: External text generation collaborator
//! - [`SnapshotStore`]: Append-only persistence of stage snapshots
//! - [`ExportManifest`] / [`QualitySummary`]: What a run hands to exporters and reviewers
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use novella_core::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = Orchestrator::new(
//!     PipelineConfig::default(),
//!     Arc::new(my_generator),
//!     Arc::new(MemorySnapshotStore::new()),
//! )?;
//! let plan = StoryPlan::new((0..12).map(|i| PlannedUnit::new(i, "brief")));
//! let mut project = orchestrator.new_project("veil", "The Veil", plan);
//! let summary = orchestrator.run(&mut project).await?;
//! println!("{}", summary.quality.to_json()?);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod manifest;
pub mod orchestrator;
pub mod project;
pub mod snapshot;
pub mod table;
pub mod telemetry;

pub use config::{PipelineConfig, RetryConfig, StageDefinition, StageKind};
pub use dispatcher::{Dispatcher, UnitOutcome};
pub use error::{ConfigError, GenerationError, PipelineError, SnapshotError};
pub use generator::{EntityMention, GenerationOutput, GenerationRequest, Generator};
pub use manifest::{CharacterSummary, ExportManifest, QualitySummary, ThreadReport};
pub use orchestrator::{Orchestrator, RunSummary, StageLine, StageOutcome};
pub use project::{NarrativeProject, PlannedUnit, StageRecord, StoryPlan};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, StageSnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use table::{ProjectHandle, ProjectTable};
pub use telemetry::init_tracing;

/// Common imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, RetryConfig, StageDefinition, StageKind};
    pub use crate::error::{GenerationError, PipelineError};
    pub use crate::generator::{GenerationOutput, GenerationRequest, Generator};
    pub use crate::manifest::{ExportManifest, QualitySummary};
    pub use crate::orchestrator::{Orchestrator, RunSummary, StageOutcome};
    pub use crate::project::{NarrativeProject, PlannedUnit, StoryPlan};
    pub use crate::snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
    pub use novella_bible::EntityKind;
    pub use novella_gate::{GateConfig, QualityReport, RepairPlan, Verdict};
    pub use novella_kernel::prelude::{BudgetConfig, ModelTier, RunStatus, StageState};
    pub use novella_scene::PointOfView;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
