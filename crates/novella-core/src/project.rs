//! Narrative project aggregate
//!
//! Everything one pipeline run owns: the plan, stage records, scenes, the
//! story bible, the n-gram corpus, the cost ledger and the stage journal.
//! A project is passed explicitly through the orchestrator; no state is
//! shared between projects.

use crate::config::{PipelineConfig, StageKind};
use crate::error::PipelineError;
use novella_bible::EntityRegistry;
use novella_gate::QualityReport;
use novella_kernel::budget::BudgetManager;
use novella_kernel::journal::StageJournal;
use novella_kernel::state_machine::{validate_transition, RunStatus, StageState};
use novella_scene::{PointOfView, Scene};
use novella_validators::{NgramCorpus, StoryShape, UnitFailure, ValidationContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scene the plan calls for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub index: usize,
    #[serde(default = "default_one")]
    pub chapter: u32,
    #[serde(default = "default_act")]
    pub act: u8,
    #[serde(default)]
    pub pov: PointOfView,
    /// Story beats this scene should land
    #[serde(default)]
    pub beats: Vec<String>,
    /// What happens, for the generator
    #[serde(default)]
    pub brief: String,
}

fn default_one() -> u32 {
    1
}

fn default_act() -> u8 {
    1
}

impl PlannedUnit {
    /// Unit in chapter 1, act 1, third person
    #[must_use]
    pub fn new(index: usize, brief: impl Into<String>) -> Self {
        Self {
            index,
            chapter: 1,
            act: 1,
            pov: PointOfView::Third,
            beats: Vec::new(),
            brief: brief.into(),
        }
    }

    /// Place in chapter and act
    #[inline]
    #[must_use]
    pub fn at(mut self, chapter: u32, act: u8) -> Self {
        self.chapter = chapter;
        self.act = act;
        self
    }

    /// With point of view
    #[inline]
    #[must_use]
    pub fn with_pov(mut self, pov: PointOfView) -> Self {
        self.pov = pov;
        self
    }

    /// With story beats
    #[must_use]
    pub fn with_beats<I, S>(mut self, beats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.beats = beats.into_iter().map(Into::into).collect();
        self
    }
}

/// Planned structure of the manuscript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryPlan {
    pub units: Vec<PlannedUnit>,
    /// Fractions where acts 2, 3, ... begin
    pub act_boundaries: Option<Vec<f64>>,
}

impl StoryPlan {
    /// Plan from units, sorted by index
    #[must_use]
    pub fn new(units: impl IntoIterator<Item = PlannedUnit>) -> Self {
        let mut units: Vec<PlannedUnit> = units.into_iter().collect();
        units.sort_by_key(|u| u.index);
        units.dedup_by_key(|u| u.index);
        Self {
            units,
            act_boundaries: None,
        }
    }

    /// Unit by scene index
    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&PlannedUnit> {
        self.units.iter().find(|u| u.index == index)
    }

    /// Macro shape validators score against
    #[must_use]
    pub fn shape(&self) -> StoryShape {
        let mut shape = StoryShape::with_planned_scenes(self.units.len());
        if let Some(bounds) = &self.act_boundaries {
            shape.act_boundaries.clone_from(bounds);
        }
        shape
    }
}

/// Progress of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub kind: StageKind,
    #[serde(default)]
    pub state: StageState,
    /// Attempts since the stage was last entered
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_report: Option<QualityReport>,
}

/// Root aggregate of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeProject {
    pub id: String,
    pub title: String,
    pub plan: StoryPlan,
    shape: StoryShape,
    stages: Vec<StageRecord>,
    scenes: Vec<Scene>,
    registry: EntityRegistry,
    corpus: NgramCorpus,
    budget: BudgetManager,
    journal: StageJournal,
    reports: Vec<QualityReport>,
    /// Units generation refused; they block until cleared
    refused: BTreeMap<usize, UnitFailure>,
    status: RunStatus,
    /// Index of the stage most recently entered
    stage_index: usize,
    /// Number of snapshots taken
    snapshot_sequence: u64,
}

impl NarrativeProject {
    /// Create a project with every stage pending
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        plan: StoryPlan,
        config: &PipelineConfig,
    ) -> Self {
        let stages = config
            .stages
            .iter()
            .map(|s| StageRecord {
                name: s.name.clone(),
                kind: s.kind,
                state: StageState::Pending,
                attempts: 0,
                last_report: None,
            })
            .collect();
        Self {
            id: id.into(),
            title: title.into(),
            shape: plan.shape(),
            plan,
            stages,
            budget: BudgetManager::new(config.budget.clone()),
            ..Self::default()
        }
    }

    /// Stage records in pipeline order
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Stage record by name
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Position of a stage by name
    #[must_use]
    pub fn stage_position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// First stage that has not passed
    #[must_use]
    pub fn next_stage(&self) -> Option<usize> {
        self.stages.iter().position(|s| s.state != StageState::Passed)
    }

    /// Scenes ordered by index
    #[inline]
    #[must_use]
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Scene by index
    #[must_use]
    pub fn scene(&self, index: usize) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.index == index)
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn corpus(&self) -> &NgramCorpus {
        &self.corpus
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &StoryShape {
        &self.shape
    }

    #[inline]
    #[must_use]
    pub fn budget(&self) -> &BudgetManager {
        &self.budget
    }

    #[inline]
    #[must_use]
    pub fn journal(&self) -> &StageJournal {
        &self.journal
    }

    /// Every quality report, oldest first
    #[inline]
    #[must_use]
    pub fn reports(&self) -> &[QualityReport] {
        &self.reports
    }

    /// Most recent quality report
    #[inline]
    #[must_use]
    pub fn last_report(&self) -> Option<&QualityReport> {
        self.reports.last()
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// Units generation refused
    pub fn refused_units(&self) -> impl Iterator<Item = &UnitFailure> {
        self.refused.values()
    }

    /// Clear a refusal once the unit was handled by hand
    pub fn clear_refusal(&mut self, index: usize) -> bool {
        self.refused.remove(&index).is_some()
    }

    /// Total words of the current revisions
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.scenes.iter().map(Scene::word_count).sum()
    }

    /// Read-only view for validators
    #[must_use]
    pub fn validation_context(&self) -> ValidationContext<'_> {
        ValidationContext::new(&self.scenes, &self.registry, &self.corpus, &self.shape)
    }

    pub(crate) fn stage_mut(&mut self, position: usize) -> Option<&mut StageRecord> {
        self.stages.get_mut(position)
    }

    /// Move a stage through the state machine
    pub(crate) fn transition(&mut self, position: usize, to: StageState) -> Result<(), PipelineError> {
        let project = self.id.clone();
        let record = self
            .stages
            .get_mut(position)
            .ok_or_else(|| PipelineError::UnknownStage(format!("#{position}")))?;
        validate_transition(record.state, to)?;
        tracing::debug!(
            project = %project,
            stage = %record.name,
            from = %record.state,
            to = %to,
            "Stage transition"
        );
        record.state = to;
        Ok(())
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub(crate) fn enter_stage(&mut self, position: usize) {
        self.stage_index = position;
    }

    pub(crate) fn scene_mut(&mut self, index: usize) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.index == index)
    }

    /// Insert a scene, keeping index order
    pub(crate) fn insert_scene(&mut self, scene: Scene) {
        match self.scenes.binary_search_by_key(&scene.index, |s| s.index) {
            Ok(pos) => self.scenes[pos] = scene,
            Err(pos) => self.scenes.insert(pos, scene),
        }
    }

    pub(crate) fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub(crate) fn corpus_mut(&mut self) -> &mut NgramCorpus {
        &mut self.corpus
    }

    pub(crate) fn budget_mut(&mut self) -> &mut BudgetManager {
        &mut self.budget
    }

    pub(crate) fn journal_mut(&mut self) -> &mut StageJournal {
        &mut self.journal
    }

    pub(crate) fn push_report(&mut self, report: QualityReport) {
        self.reports.push(report);
    }

    pub(crate) fn refuse(&mut self, failure: UnitFailure) {
        self.refused.insert(failure.scene_index, failure);
    }

    pub(crate) fn next_snapshot_sequence(&mut self) -> u64 {
        self.snapshot_sequence += 1;
        self.snapshot_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(n: usize) -> StoryPlan {
        StoryPlan::new((0..n).rev().map(|i| PlannedUnit::new(i, format!("scene {i}"))))
    }

    #[test]
    fn new_project_has_pending_stages() {
        let project = NarrativeProject::new("p1", "The Veil", plan(4), &PipelineConfig::default());
        assert_eq!(project.stages().len(), 3);
        assert!(project.stages().iter().all(|s| s.state == StageState::Pending));
        assert_eq!(project.next_stage(), Some(0));
        assert_eq!(project.shape().planned_scenes, 4);
        assert_eq!(project.status(), RunStatus::NotStarted);
    }

    #[test]
    fn plan_is_sorted_and_unique() {
        let plan = StoryPlan::new([
            PlannedUnit::new(2, "b"),
            PlannedUnit::new(0, "a"),
            PlannedUnit::new(2, "dup"),
        ]);
        assert_eq!(plan.units.iter().map(|u| u.index).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn transitions_go_through_the_state_machine() {
        let mut project = NarrativeProject::new("p1", "t", plan(1), &PipelineConfig::default());
        assert!(project.transition(0, StageState::Running).is_ok());
        assert!(project.transition(0, StageState::Passed).is_ok());
        #[cfg(not(feature = "strict-debug"))]
        assert!(matches!(
            project.transition(0, StageState::Pending),
            Err(PipelineError::IllegalTransition(_))
        ));
    }

    #[test]
    fn scenes_stay_ordered() {
        let mut project = NarrativeProject::default();
        for i in [3, 1, 2] {
            project.insert_scene(Scene::new(i, 1, 1, PointOfView::Third, "draft", "x"));
        }
        let order: Vec<usize> = project.scenes().iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
