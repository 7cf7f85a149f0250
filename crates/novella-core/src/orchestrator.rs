//! Pipeline orchestrator
//!
//! Sequences stages through the state machine:
//! - Generates units concurrently, applies outputs in unit order as the
//!   single writer of scenes, story bible and corpus
//! - Evaluates every attempt through the quality gate and snapshots it
//! - Regenerates only implicated units on retryable failures
//! - Halts on blocking failures, aborts on budget exhaustion, cancellation
//!   or an exceeded wall-clock budget
//! - Resumes from the latest snapshot, repairing a blocked stage first

use crate::config::{PipelineConfig, StageKind};
use crate::dispatcher::{Dispatcher, UnitOutcome};
use crate::error::{GenerationError, PipelineError};
use crate::generator::{GenerationOutput, GenerationRequest, Generator};
use crate::manifest::{ExportManifest, QualitySummary};
use crate::project::{NarrativeProject, StoryPlan};
use crate::snapshot::{SnapshotStore, StageSnapshot, SNAPSHOT_SCHEMA_VERSION};
use chrono::Utc;
use novella_bible::{ContinuityViolation, EntityKind};
use novella_gate::{QualityGate, QualityReport, RepairPlan};
use novella_kernel::budget::BudgetStatus;
use novella_kernel::journal::JournalEvent;
use novella_kernel::state_machine::{RunStatus, StageState};
use novella_scene::Scene;
use novella_validators::UnitFailure;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of running one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub stage: String,
    /// State the stage ended in
    pub state: StageState,
    pub attempts: u32,
    /// Report of the last attempt; `None` when aborted before evaluation
    pub report: Option<QualityReport>,
    pub budget: BudgetStatus,
}

impl StageOutcome {
    /// Whether the stage passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.state == StageState::Passed
    }

    /// Repair plan of the last attempt, if it failed
    #[must_use]
    pub fn repair_plan(&self) -> Option<&RepairPlan> {
        self.report.as_ref().and_then(|r| r.repair_plan.as_ref())
    }
}

/// One stage line of a run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLine {
    pub name: String,
    pub state: StageState,
    pub attempts: u32,
}

/// Result of `run` or `resume`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub project_id: String,
    pub status: RunStatus,
    pub stages: Vec<StageLine>,
    pub quality: QualitySummary,
    /// Always present after a complete run
    pub manifest: Option<ExportManifest>,
    pub budget: BudgetStatus,
}

/// Which units an attempt regenerates
#[derive(Debug, Clone, PartialEq, Eq)]
enum UnitSelection {
    All,
    Only(BTreeSet<usize>),
}

/// Why a stage stopped without a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    WallClock,
}

impl Halt {
    fn event(self) -> JournalEvent {
        match self {
            Self::Cancelled => JournalEvent::Cancelled,
            Self::WallClock => JournalEvent::Aborted,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Self::Cancelled => "run cancelled",
            Self::WallClock => "wall-clock budget exceeded",
        }
    }
}

/// Drives projects through the configured stages
pub struct Orchestrator {
    config: PipelineConfig,
    generator: Arc<dyn Generator>,
    store: Arc<dyn SnapshotStore>,
    gate: QualityGate,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create orchestrator
    ///
    /// # Errors
    /// `PipelineError::Config` when the configuration is inconsistent.
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            gate: QualityGate::new(config.gate.clone()),
            config,
            generator,
            store,
            cancel: CancellationToken::new(),
        })
    }

    /// Share a cancellation token with the caller
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this orchestrator
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop starting generation calls; the current attempt is discarded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// New project with this pipeline's stages and budget
    #[must_use]
    pub fn new_project(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        plan: StoryPlan,
    ) -> NarrativeProject {
        NarrativeProject::new(id, title, plan, &self.config)
    }

    /// Run one stage to a verdict, retrying implicated units.
    ///
    /// # Errors
    /// - `UnknownStage` / `OutOfOrder` for caller bugs
    /// - `ProjectAborted` when the project was aborted
    /// - `BudgetExhausted` when nothing is left to spend
    /// - `Persistence` when a snapshot cannot be saved
    pub async fn run_stage(
        &self,
        stage: &str,
        project: &mut NarrativeProject,
    ) -> Result<StageOutcome, PipelineError> {
        let position = check_runnable(stage, project)?;
        let reentry = project.stages()[position].state == StageState::Passed;
        self.drive_stage(project, position, UnitSelection::All, reentry, None, BTreeMap::new())
            .await
    }

    /// Run every remaining stage until the project completes, blocks or aborts.
    ///
    /// # Errors
    /// `Persistence` or a state machine error; quality failures are not errors.
    pub async fn run(&self, project: &mut NarrativeProject) -> Result<RunSummary, PipelineError> {
        let deadline = self.deadline();
        self.run_from(project, deadline).await?;
        Ok(self.summarize(project))
    }

    /// Load the latest snapshot and continue.
    ///
    /// A blocked stage is repaired first: the plan's units are regenerated in
    /// the stages responsible for them, then the blocked stage is re-run.
    ///
    /// # Errors
    /// `Persistence` when no snapshot exists or it cannot be read.
    pub async fn resume(
        &self,
        project_id: &str,
    ) -> Result<(NarrativeProject, RunSummary), PipelineError> {
        let snapshot = self.store.load_latest_snapshot(project_id).await?;
        let mut project = snapshot.project;
        tracing::info!(
            project = project_id,
            sequence = snapshot.sequence,
            stage = %snapshot.stage,
            state = %snapshot.state,
            "Resuming from snapshot"
        );

        if project.status() == RunStatus::Aborted {
            tracing::warn!(project = project_id, "Project was aborted; returning partial state");
            let summary = self.summarize(&project);
            return Ok((project, summary));
        }

        project.journal_mut().append(
            snapshot.stage.as_str(),
            snapshot.attempt,
            JournalEvent::Resumed,
            format!("from snapshot {}", snapshot.sequence),
        );

        let deadline = self.deadline();
        let mut blocked = snapshot.state == StageState::FailedBlocking;
        if blocked {
            let plan = snapshot
                .report
                .and_then(|r| r.repair_plan)
                .unwrap_or_default();
            blocked = !self
                .repair(&mut project, snapshot.stage_index, &plan, deadline)
                .await?;
        }
        if !blocked {
            self.run_from(&mut project, deadline).await?;
        }
        let summary = self.summarize(&project);
        Ok((project, summary))
    }

    /// Summary of the project as it stands
    #[must_use]
    pub fn summarize(&self, project: &NarrativeProject) -> RunSummary {
        let manifest = (project.status() == RunStatus::Complete)
            .then(|| ExportManifest::from_project(project, self.config.drop_window()));
        RunSummary {
            project_id: project.id.clone(),
            status: project.status(),
            stages: project
                .stages()
                .iter()
                .map(|s| StageLine {
                    name: s.name.clone(),
                    state: s.state,
                    attempts: s.attempts,
                })
                .collect(),
            quality: QualitySummary::from_project(project),
            manifest,
            budget: project.budget().status(),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.wall_clock_budget().map(|b| Instant::now() + b)
    }

    async fn run_from(
        &self,
        project: &mut NarrativeProject,
        deadline: Option<Instant>,
    ) -> Result<(), PipelineError> {
        if project.status().is_terminal() {
            return Ok(());
        }
        while let Some(position) = project.next_stage() {
            if project.budget().is_exhausted() {
                self.abort_budget(project, position).await?;
                return Ok(());
            }
            let outcome = self
                .drive_stage(project, position, UnitSelection::All, false, deadline, BTreeMap::new())
                .await?;
            if !outcome.passed() {
                return Ok(());
            }
        }

        project.set_status(RunStatus::Complete);
        project
            .journal_mut()
            .append("", 0, JournalEvent::Completed, "all stages passed");
        tracing::info!(
            project = %project.id,
            words = project.word_count(),
            spent = project.budget().spent(),
            "Run complete"
        );
        Ok(())
    }

    /// Re-enter stages from the earliest responsible one through `blocked`.
    /// Returns whether every re-run passed.
    async fn repair(
        &self,
        project: &mut NarrativeProject,
        blocked: usize,
        plan: &RepairPlan,
        deadline: Option<Instant>,
    ) -> Result<bool, PipelineError> {
        let first = plan
            .stages()
            .into_iter()
            .filter_map(|s| project.stage_position(s))
            .min()
            .unwrap_or(blocked)
            .min(blocked);

        let mut reasons: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for entry in plan.entries() {
            if let Some(index) = entry.scene_index {
                reasons.entry(index).or_default().push(entry.reason.clone());
            }
        }

        tracing::info!(
            project = %project.id,
            from = %project.stages()[first].name,
            blocked = %project.stages()[blocked].name,
            entries = plan.len(),
            "Entering repair"
        );

        // Units regenerated upstream are regenerated again downstream
        let mut carried: BTreeSet<usize> = BTreeSet::new();
        for position in first..=blocked {
            let (name, kind) = {
                let record = &project.stages()[position];
                (record.name.clone(), record.kind)
            };
            carried.extend(plan.units_for(&name));
            let selection = if plan.whole_stage(&name) && kind != StageKind::Audit {
                UnitSelection::All
            } else {
                UnitSelection::Only(carried.clone())
            };
            let idle = selection == UnitSelection::Only(BTreeSet::new()) || kind == StageKind::Audit;
            if position != blocked && idle {
                continue;
            }

            let outcome = self
                .drive_stage(project, position, selection, position != blocked, deadline, reasons.clone())
                .await?;
            if !outcome.passed() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Attempt loop of one stage
    async fn drive_stage(
        &self,
        project: &mut NarrativeProject,
        position: usize,
        initial: UnitSelection,
        repair: bool,
        deadline: Option<Instant>,
        initial_reasons: BTreeMap<usize, Vec<String>>,
    ) -> Result<StageOutcome, PipelineError> {
        let (name, kind) = {
            let record = &project.stages()[position];
            (record.name.clone(), record.kind)
        };
        project.enter_stage(position);
        project.set_status(RunStatus::Running);
        if let Some(record) = project.stage_mut(position) {
            record.attempts = 0;
        }

        let mut selection = initial;
        let mut reasons = initial_reasons;
        loop {
            if let Some(halt) = self.halted(deadline) {
                return self.abort(project, position, halt, repair).await;
            }

            let attempt = project.stages()[position].attempts + 1;
            if let Some(record) = project.stage_mut(position) {
                record.attempts = attempt;
            }
            project.transition(position, StageState::Running)?;
            let event = if repair && attempt == 1 {
                JournalEvent::RepairEntered
            } else {
                JournalEvent::StageStarted
            };
            project
                .journal_mut()
                .append(name.as_str(), attempt, event, describe(&selection));
            tracing::info!(project = %project.id, stage = %name, attempt, repair, "Stage attempt started");

            let requests = build_requests(project, &name, kind, &selection, attempt, &reasons);
            let dispatcher = Dispatcher::new(
                Arc::clone(&self.generator),
                self.config.parallelism,
                self.config.call_timeout(),
                self.config.retry,
            )
            .with_cancellation(self.cancel.clone())
            .with_deadline(deadline);
            let outcomes = dispatcher.dispatch(requests).await;

            // Nothing from an interrupted attempt is merged, but finished calls are paid for
            if let Some(halt) = self.halted(deadline) {
                charge_discarded(project, &outcomes);
                return self.abort(project, position, halt, repair).await;
            }

            let tier_before = project.budget().active_tier();
            let (exhausted, continuity) = self.apply_outputs(project, &name, kind, outcomes);
            let tier_after = project.budget().active_tier();
            if tier_after != tier_before {
                project.journal_mut().append(
                    name.as_str(),
                    attempt,
                    JournalEvent::TierDowngraded,
                    format!("{tier_before} -> {tier_after}"),
                );
            }

            let report = {
                let mut failures: Vec<UnitFailure> = project.refused_units().cloned().collect();
                failures.extend(exhausted);
                let current = project.scenes().iter().map(|s| s.index).max().unwrap_or_default();
                let ctx = project
                    .validation_context()
                    .with_continuity(&continuity)
                    .with_failures(&failures)
                    .with_current_scene(current);
                let units: Vec<&Scene> = project.scenes().iter().collect();
                self.gate.evaluate_stage(&name, &units, &ctx)
            };

            let retry_units = report
                .repair_plan
                .as_ref()
                .map(|plan| retry_selection(plan, &name, kind));

            let state = if project.budget().is_exhausted() {
                StageState::Aborted
            } else {
                match StageState::from(report.verdict) {
                    StageState::FailedRetryable => {
                        let nothing_to_retry = retry_units.as_ref().map_or(true, Option::is_none);
                        if attempt >= self.config.max_attempts || nothing_to_retry {
                            project.transition(position, StageState::FailedRetryable)?;
                            tracing::warn!(
                                stage = %name,
                                attempt,
                                max_attempts = self.config.max_attempts,
                                "Escalating retryable failure to blocking"
                            );
                            StageState::FailedBlocking
                        } else {
                            StageState::FailedRetryable
                        }
                    }
                    other => other,
                }
            };
            project.transition(position, state)?;

            match state {
                StageState::FailedBlocking => project.set_status(RunStatus::Blocked),
                StageState::Aborted => {
                    project.set_status(RunStatus::Aborted);
                    let budget = project.budget().status();
                    tracing::error!(
                        project = %project.id,
                        stage = %name,
                        spent = project.budget().spent(),
                        remaining = budget.remaining,
                        "Budget exhausted, aborting run"
                    );
                    project.journal_mut().append(
                        name.as_str(),
                        attempt,
                        JournalEvent::Aborted,
                        "budget exhausted",
                    );
                }
                _ => {}
            }

            if let Some(record) = project.stage_mut(position) {
                record.last_report = Some(report.clone());
            }
            project.push_report(report.clone());
            project.journal_mut().append(
                name.as_str(),
                attempt,
                JournalEvent::AttemptFinished,
                format!("{state} score={:.3}", report.overall_score),
            );
            tracing::info!(
                project = %project.id,
                stage = %name,
                attempt,
                state = %state,
                score = report.overall_score,
                "Stage attempt finished"
            );
            self.save_snapshot(project, position, attempt, repair, state, Some(report.clone()))
                .await?;

            if state == StageState::FailedRetryable {
                if let Some(Some(next)) = retry_units {
                    reasons = repair_reasons(report.repair_plan.as_ref());
                    selection = next;
                    continue;
                }
            }

            return Ok(StageOutcome {
                stage: name,
                state,
                attempts: attempt,
                report: Some(report),
                budget: project.budget().status(),
            });
        }
    }

    fn halted(&self, deadline: Option<Instant>) -> Option<Halt> {
        if self.cancel.is_cancelled() {
            Some(Halt::Cancelled)
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Halt::WallClock)
        } else {
            None
        }
    }

    /// Apply outputs in unit order; returns transient failures and
    /// continuity violations raised by this attempt
    fn apply_outputs(
        &self,
        project: &mut NarrativeProject,
        stage: &str,
        kind: StageKind,
        outcomes: Vec<UnitOutcome>,
    ) -> (Vec<UnitFailure>, Vec<ContinuityViolation>) {
        let mut exhausted = Vec::new();
        let mut continuity = Vec::new();

        for outcome in outcomes {
            let index = outcome.scene_index;
            match outcome.result {
                Ok(output) => {
                    let status = project.budget_mut().charge(
                        output.tokens_in,
                        output.tokens_out,
                        output.model_tier,
                    );
                    tracing::debug!(
                        scene_index = index,
                        charged = status.charged,
                        remaining = status.remaining,
                        "Charged generation call"
                    );
                    self.apply_output(project, stage, kind, index, output, &mut continuity);
                }
                Err(GenerationError::Policy(reason)) => {
                    tracing::warn!(stage, scene_index = index, %reason, "Unit refused by generator");
                    project.refuse(UnitFailure::refused(index, reason));
                }
                Err(GenerationError::Cancelled) => {}
                Err(e) => exhausted.push(UnitFailure::exhausted(index, e.to_string())),
            }
        }
        (exhausted, continuity)
    }

    fn apply_output(
        &self,
        project: &mut NarrativeProject,
        stage: &str,
        kind: StageKind,
        index: usize,
        output: GenerationOutput,
        continuity: &mut Vec<ContinuityViolation>,
    ) {
        let tags = self.config.gate.validators.structure_detector().detect(&output.text);
        let unit = project.plan.unit(index).cloned();
        let GenerationOutput {
            text,
            mentions,
            pov,
            beats,
            frame_breaks,
            ..
        } = output;

        let act = if let Some(scene) = project.scene_mut(index) {
            if !scene.revise(stage, text.as_str()) {
                tracing::debug!(stage, scene_index = index, "Revision unchanged");
            }
            if let Some(pov) = pov {
                scene.pov = pov;
            }
            scene.beats.extend(beats);
            scene.frame_breaks = frame_breaks.into_iter().collect();
            scene.tags = tags;
            scene.act
        } else {
            let (chapter, act, planned_pov, planned_beats) = unit.map_or(
                (1, 1, novella_scene::PointOfView::default(), Vec::new()),
                |u| (u.chapter, u.act, u.pov, u.beats),
            );
            if kind == StageKind::Revise {
                tracing::warn!(stage, scene_index = index, "Revising a scene that was never drafted");
            }
            let mut scene = Scene::new(index, chapter, act, pov.unwrap_or(planned_pov), stage, text.as_str())
                .with_beats(planned_beats.into_iter().chain(beats))
                .with_frame_breaks(frame_breaks);
            scene.tags = tags;
            project.insert_scene(scene);
            act
        };
        project.corpus_mut().upsert_scene(index, &text);

        for mention in mentions {
            let mut payload = mention.payload;
            if mention.kind == EntityKind::Motif {
                if let Some(fields) = payload.as_object_mut() {
                    fields
                        .entry("act")
                        .or_insert_with(|| serde_json::Value::from(act));
                }
            }
            let result = project
                .registry_mut()
                .register_or_validate(mention.kind, &payload, index);
            if let Some(violation) = result.violation() {
                continuity.push(violation.clone());
            }
        }
    }

    async fn abort(
        &self,
        project: &mut NarrativeProject,
        position: usize,
        halt: Halt,
        repair: bool,
    ) -> Result<StageOutcome, PipelineError> {
        let (name, attempts, current) = {
            let record = &project.stages()[position];
            (record.name.clone(), record.attempts, record.state)
        };
        if current != StageState::Passed && current != StageState::Aborted {
            project.transition(position, StageState::Aborted)?;
        }
        project.set_status(RunStatus::Aborted);
        project
            .journal_mut()
            .append(name.as_str(), attempts, halt.event(), halt.reason());
        tracing::warn!(project = %project.id, stage = %name, reason = halt.reason(), "Run aborted");

        let state = project.stages()[position].state;
        self.save_snapshot(project, position, attempts, repair, state, None)
            .await?;
        Ok(StageOutcome {
            stage: name,
            state,
            attempts,
            report: None,
            budget: project.budget().status(),
        })
    }

    async fn abort_budget(
        &self,
        project: &mut NarrativeProject,
        position: usize,
    ) -> Result<(), PipelineError> {
        let name = project.stages()[position].name.clone();
        let current = project.stages()[position].state;
        if current != StageState::Passed && current != StageState::Aborted {
            project.transition(position, StageState::Aborted)?;
        }
        project.set_status(RunStatus::Aborted);
        project
            .journal_mut()
            .append(name.as_str(), 0, JournalEvent::Aborted, "budget exhausted");
        tracing::error!(project = %project.id, stage = %name, "Budget exhausted before stage start");
        let state = project.stages()[position].state;
        self.save_snapshot(project, position, 0, false, state, None).await
    }

    async fn save_snapshot(
        &self,
        project: &mut NarrativeProject,
        position: usize,
        attempt: u32,
        repair: bool,
        state: StageState,
        report: Option<QualityReport>,
    ) -> Result<(), PipelineError> {
        let sequence = project.next_snapshot_sequence();
        let snapshot = StageSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            sequence,
            project_id: project.id.clone(),
            stage_index: position,
            stage: project.stages()[position].name.clone(),
            attempt,
            repair,
            timestamp: Utc::now(),
            state,
            project: project.clone(),
            report,
        };
        self.store.save_snapshot(&project.id, &snapshot).await?;
        Ok(())
    }
}

/// Position of `stage` if it may run now
/// Charge calls whose text is dropped by an interrupted attempt
fn charge_discarded(project: &mut NarrativeProject, outcomes: &[UnitOutcome]) {
    for outcome in outcomes {
        if let Ok(output) = &outcome.result {
            let status = project
                .budget_mut()
                .charge(output.tokens_in, output.tokens_out, output.model_tier);
            tracing::debug!(
                scene_index = outcome.scene_index,
                charged = status.charged,
                "Charged discarded generation call"
            );
        }
    }
}

fn check_runnable(stage: &str, project: &NarrativeProject) -> Result<usize, PipelineError> {
    if project.status() == RunStatus::Aborted {
        return Err(PipelineError::ProjectAborted(project.id.clone()));
    }
    let position = project
        .stage_position(stage)
        .ok_or_else(|| PipelineError::UnknownStage(stage.to_string()))?;
    if let Some(prerequisite) = project.stages()[..position]
        .iter()
        .find(|s| s.state != StageState::Passed)
    {
        return Err(PipelineError::OutOfOrder {
            stage: stage.to_string(),
            prerequisite: prerequisite.name.clone(),
        });
    }
    if project.budget().is_exhausted() {
        return Err(PipelineError::BudgetExhausted {
            spent: project.budget().spent(),
            ceiling: project.budget().config().ceiling,
        });
    }
    Ok(position)
}

/// Units a failed stage can retry itself; `None` when nothing it generates
/// would change the verdict
fn retry_selection(plan: &RepairPlan, stage: &str, kind: StageKind) -> Option<UnitSelection> {
    if kind == StageKind::Audit || plan.has_hard_stop() {
        return None;
    }
    if plan.whole_stage(stage) {
        return Some(UnitSelection::All);
    }
    let units = plan.units_for(stage);
    (!units.is_empty()).then_some(UnitSelection::Only(units))
}

fn repair_reasons(plan: Option<&RepairPlan>) -> BTreeMap<usize, Vec<String>> {
    let mut reasons: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for entry in plan.map(RepairPlan::entries).unwrap_or_default() {
        if let Some(index) = entry.scene_index {
            reasons.entry(index).or_default().push(entry.reason.clone());
        }
    }
    reasons
}

fn describe(selection: &UnitSelection) -> String {
    match selection {
        UnitSelection::All => "all units".to_string(),
        UnitSelection::Only(units) => format!("units {units:?}"),
    }
}

fn build_requests(
    project: &NarrativeProject,
    stage: &str,
    kind: StageKind,
    selection: &UnitSelection,
    attempt: u32,
    reasons: &BTreeMap<usize, Vec<String>>,
) -> Vec<GenerationRequest> {
    if kind == StageKind::Audit {
        return Vec::new();
    }
    let refused: BTreeSet<usize> = project.refused_units().map(|f| f.scene_index).collect();
    let registry = Arc::new(project.registry().clone());
    let tier = project.budget().active_tier();

    project
        .plan
        .units
        .iter()
        .filter(|u| match selection {
            UnitSelection::All => true,
            UnitSelection::Only(units) => units.contains(&u.index),
        })
        .filter(|u| !refused.contains(&u.index))
        .map(|unit| GenerationRequest {
            project_id: project.id.clone(),
            stage: stage.to_string(),
            stage_kind: kind,
            unit: unit.clone(),
            attempt,
            tier,
            current_text: project.scene(unit.index).map(|s| s.text().to_string()),
            repair_reasons: reasons.get(&unit.index).cloned().unwrap_or_default(),
            registry: Arc::clone(&registry),
        })
        .collect()
}
