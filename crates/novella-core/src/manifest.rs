//! Export manifest and quality summary
//!
//! - [`ExportManifest`]: what a document exporter needs besides the scenes
//! - [`QualitySummary`]: machine-readable verdict of a whole run

use crate::project::NarrativeProject;
use novella_bible::Role;
use novella_gate::{QualityReport, RepairPlan};
use novella_kernel::state_machine::RunStatus;
use novella_validators::Violation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Character line of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub name: String,
    pub role: Role,
    pub first_appearance: usize,
    pub last_appearance: usize,
    /// Recorded role changes
    pub transitions: usize,
}

/// Unresolved thread line of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub label: String,
    pub introduced_at: usize,
    pub last_referenced: usize,
    /// Untouched for longer than the drop window
    pub dropped: bool,
}

/// Data handed to a document exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub project_id: String,
    pub title: String,
    pub word_count: usize,
    pub scene_count: usize,
    /// Latest overall score per stage
    pub stage_scores: BTreeMap<String, f64>,
    pub characters: Vec<CharacterSummary>,
    pub unresolved_threads: Vec<ThreadReport>,
}

impl ExportManifest {
    /// Build from the project's current state
    #[must_use]
    pub fn from_project(project: &NarrativeProject, drop_window: usize) -> Self {
        let current = project.scenes().iter().map(|s| s.index).max().unwrap_or_default();
        let stage_scores = project
            .stages()
            .iter()
            .filter_map(|s| s.last_report.as_ref().map(|r| (s.name.clone(), r.overall_score)))
            .collect();
        let characters = project
            .registry()
            .characters()
            .map(|c| CharacterSummary {
                name: c.name.clone(),
                role: c.role,
                first_appearance: c.first_appearance,
                last_appearance: c.last_appearance,
                transitions: c.transitions.len(),
            })
            .collect();
        let unresolved_threads = project
            .registry()
            .unresolved_threads()
            .map(|t| ThreadReport {
                label: t.label.clone(),
                introduced_at: t.introduced_at,
                last_referenced: t.last_referenced,
                dropped: t.is_dropped(current, drop_window),
            })
            .collect();

        Self {
            project_id: project.id.clone(),
            title: project.title.clone(),
            word_count: project.word_count(),
            scene_count: project.scenes().len(),
            stage_scores,
            characters,
            unresolved_threads,
        }
    }
}

/// Verdict of a run as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub project_id: String,
    pub status: RunStatus,
    /// Stage the verdict comes from
    pub stage: Option<String>,
    pub overall_score: f64,
    /// Latest score per validator, across stages
    pub validator_scores: BTreeMap<String, f64>,
    pub blocking_violations: Vec<Violation>,
    /// Present when the run stopped on a failed stage
    pub repair_plan: Option<RepairPlan>,
}

impl QualitySummary {
    /// Summarize the project's latest reports
    #[must_use]
    pub fn from_project(project: &NarrativeProject) -> Self {
        let latest: Vec<&QualityReport> = project
            .stages()
            .iter()
            .filter_map(|s| s.last_report.as_ref())
            .collect();

        let mut validator_scores = BTreeMap::new();
        for report in &latest {
            for result in &report.results {
                validator_scores.insert(result.validator.to_string(), result.score);
            }
        }

        let deciding = project.last_report();
        Self {
            project_id: project.id.clone(),
            status: project.status(),
            stage: deciding.map(|r| r.stage.clone()),
            overall_score: deciding.map_or(0.0, |r| r.overall_score),
            validator_scores,
            blocking_violations: latest
                .iter()
                .flat_map(|r| r.blocking_violations().cloned())
                .collect(),
            repair_plan: deciding.and_then(|r| r.repair_plan.clone()),
        }
    }

    /// Whether the run completed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Complete
    }

    /// Encode as pretty JSON
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
