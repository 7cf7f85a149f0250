//! End-to-end pipeline runs against a scripted generator

use async_trait::async_trait;
use novella_core::prelude::*;
use novella_gate::{StageProfile, WeightedValidator};
use novella_kernel::journal::JournalEvent;
use novella_test_utils::{lenient_gate, lenient_pipeline, plan, prose, ScriptedGenerator, FLAT, POV_CLEAN, POV_SLIP};
use novella_validators::ValidatorKind;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn orchestrator(
    config: PipelineConfig,
    generator: &Arc<ScriptedGenerator>,
    store: &Arc<MemorySnapshotStore>,
) -> Orchestrator {
    Orchestrator::new(config, Arc::clone(generator) as Arc<dyn Generator>, Arc::clone(store) as Arc<dyn SnapshotStore>)
        .unwrap()
}

fn events(project: &NarrativeProject) -> Vec<JournalEvent> {
    project.journal().entries().iter().map(|e| e.event).collect()
}

#[tokio::test]
async fn clean_run_completes_with_manifest() {
    let generator = Arc::new(ScriptedGenerator::new().with_tokens(100, 200));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("veil", "The Veil", plan(3));

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Complete);
    assert!(summary.quality.passed());
    assert!(summary.stages.iter().all(|s| s.state == StageState::Passed && s.attempts == 1));
    let manifest = summary.manifest.expect("complete runs carry a manifest");
    assert_eq!(manifest.scene_count, 3);
    assert_eq!(manifest.word_count, project.word_count());
    assert_eq!(manifest.stage_scores.len(), 3);

    assert_eq!(generator.calls_in("draft"), 3);
    assert_eq!(generator.calls_in("polish"), 3);
    assert_eq!(generator.calls_in("audit"), 0);
    assert!(project.scenes().iter().all(|s| s.origin_stage() == "polish"));
    assert_eq!(store.count("veil"), 3);
    assert!(project.journal().verify_integrity().is_ok());
    assert_eq!(events(&project).last(), Some(&JournalEvent::Completed));
}

#[tokio::test]
async fn pov_slip_is_regenerated_alone() {
    let mut config = lenient_pipeline().with_stages([StageDefinition::new("draft", StageKind::Draft)]);
    config.gate = config
        .gate
        .with_stage("draft", StageProfile::of([WeightedValidator::new(ValidatorKind::Pov)]));
    let generator = Arc::new(
        ScriptedGenerator::new()
            .text("draft", 0, POV_SLIP)
            .text("draft", 0, POV_CLEAN),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("square", "The Square", plan(2));

    let outcome = orch.run_stage("draft", &mut project).await.unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(generator.calls_for("draft", 0), 2);
    assert_eq!(generator.calls_for("draft", 1), 1);

    let retry = &generator.calls()[2];
    assert_eq!((retry.unit, retry.attempt), (0, 2));
    assert!(retry.repair_reasons.iter().any(|r| r.contains("paragraph 2")));

    let first = &project.reports()[0];
    assert_eq!(first.verdict, Verdict::FailedRetryable);
    assert!(first.overall_score < 0.85);
    assert_eq!(project.scene(0).unwrap().text(), POV_CLEAN);
}

#[tokio::test]
async fn flat_opening_blocks_the_run() {
    let generator = Arc::new(ScriptedGenerator::new().text("draft", 0, FLAT));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(PipelineConfig::default(), &generator, &store);
    let plan = StoryPlan::new([PlannedUnit::new(0, "opening").at(1, 1)]);
    let mut project = orch.new_project("grey", "Grey Room", plan);

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Blocked);
    assert_eq!(project.stage("draft").unwrap().state, StageState::FailedBlocking);
    assert_eq!(project.stage("draft").unwrap().attempts, 1);
    assert_eq!(project.stage("polish").unwrap().state, StageState::Pending);
    assert_eq!(generator.calls_in("polish"), 0);
    assert!(summary.manifest.is_none());
    assert!(summary
        .quality
        .blocking_violations
        .iter()
        .any(|v| v.validator == ValidatorKind::SceneStructure && v.scene_index == Some(0)));
    assert!(summary.quality.repair_plan.is_some());
}

#[tokio::test]
async fn budget_exhaustion_aborts_and_keeps_partial_state() {
    // two premium calls at 600 each against a ceiling of 1000
    let config = lenient_pipeline().with_budget(BudgetConfig::default().with_ceiling(1000.0));
    let generator = Arc::new(ScriptedGenerator::new().with_tokens(0, 40_000));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("costly", "Costly", plan(2));

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(summary.budget.exhausted);
    assert_eq!(project.stage("draft").unwrap().state, StageState::Aborted);
    assert!(project.budget().spent() >= 1200.0 - 1e-9);

    let snapshots = store.list_snapshots("costly").await.unwrap();
    assert_eq!(snapshots.last().unwrap().state, StageState::Aborted);

    let (resumed, again) = orch.resume("costly").await.unwrap();
    assert_eq!(again.status, RunStatus::Aborted);
    assert_eq!(resumed.scenes().len(), 2);
    assert_eq!(generator.calls().len(), 2);

    let mut resumed = resumed;
    assert!(matches!(
        orch.run_stage("draft", &mut resumed).await,
        Err(PipelineError::ProjectAborted(_))
    ));
}

#[tokio::test]
async fn low_balance_downgrades_the_tier() {
    // 300 per premium call: the third draft call leaves 100 of 1000
    let config = lenient_pipeline().with_budget(BudgetConfig::default().with_ceiling(1000.0));
    let generator = Arc::new(ScriptedGenerator::new().with_tokens(0, 20_000));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("thrift", "Thrift", plan(3));

    orch.run(&mut project).await.unwrap();

    assert!(events(&project).contains(&JournalEvent::TierDowngraded));
    let polish: Vec<_> = generator.calls().into_iter().filter(|c| c.stage == "polish").collect();
    assert!(!polish.is_empty());
    assert!(polish.iter().all(|c| c.tier < ModelTier::Premium));
}

#[tokio::test]
async fn static_motif_blocks_the_audit() {
    let motif = |text: &str| {
        GenerationOutput::new(text).with_mention(
            EntityKind::Motif,
            json!({"label": "veil", "manifestation": "the veil hides her face"}),
        )
    };
    let generator = Arc::new(
        ScriptedGenerator::new()
            .reply("draft", 0, Ok(motif(&prose(0))))
            .reply("draft", 1, Ok(motif(&prose(1)))),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let plan = StoryPlan::new([
        PlannedUnit::new(0, "veil appears").at(2, 1),
        PlannedUnit::new(1, "veil returns").at(8, 3),
    ]);
    let mut project = orch.new_project("static", "Static", plan);

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(project.stage("polish").unwrap().state, StageState::Passed);
    assert_eq!(project.stage("audit").unwrap().state, StageState::FailedBlocking);
    assert_eq!(summary.status, RunStatus::Blocked);

    let report = project.stage("audit").unwrap().last_report.clone().unwrap();
    assert_eq!(report.verdict, Verdict::FailedRetryable);
    assert!(report.score_of(ValidatorKind::MotifEvolution).unwrap() < 0.5);
    assert!(report.repair_plan.unwrap().whole_stage("audit"));
    assert_eq!(project.registry().motif("veil").unwrap().manifestations.len(), 2);
}

#[tokio::test]
async fn refusal_is_a_hard_stop_until_cleared() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .fail("draft", 1, GenerationError::Policy("content policy".into()))
            .text("draft", 1, &prose(1)),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("refused", "Refused", plan(2));

    let summary = orch.run(&mut project).await.unwrap();
    assert_eq!(summary.status, RunStatus::Blocked);
    assert_eq!(project.stage("draft").unwrap().attempts, 1);
    assert!(summary.quality.repair_plan.as_ref().unwrap().has_hard_stop());
    assert_eq!(project.refused_units().count(), 1);

    // resume cannot repair a refusal
    let (mut resumed, again) = orch.resume("refused").await.unwrap();
    assert_eq!(again.status, RunStatus::Blocked);
    assert_eq!(generator.calls_for("draft", 1), 1);

    assert!(resumed.clear_refusal(1));
    let done = orch.run(&mut resumed).await.unwrap();
    assert_eq!(done.status, RunStatus::Complete);
    assert_eq!(generator.calls_for("draft", 1), 2);
}

#[tokio::test]
async fn transient_failure_is_retried_within_the_attempt() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .fail("draft", 0, GenerationError::Transient("rate limited".into()))
            .text("draft", 0, &prose(0)),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("flaky", "Flaky", plan(1));

    let outcome = orch.run_stage("draft", &mut project).await.unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(generator.calls_for("draft", 0), 2);
}

#[tokio::test]
async fn exhausted_retries_fail_the_attempt_not_the_run() {
    let mut config = lenient_pipeline();
    config.retry.max_retries = 1;
    let generator = Arc::new(
        ScriptedGenerator::new()
            .fail("draft", 0, GenerationError::Transient("overloaded".into()))
            .fail("draft", 0, GenerationError::Transient("overloaded".into()))
            .text("draft", 0, &prose(0)),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("busy", "Busy", plan(1));

    let outcome = orch.run_stage("draft", &mut project).await.unwrap();

    assert!(outcome.passed());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(generator.calls_for("draft", 0), 3);
    assert_eq!(project.reports()[0].verdict, Verdict::FailedRetryable);
}

#[tokio::test]
async fn slow_generator_times_out_until_blocking() {
    let mut config = lenient_pipeline().with_call_timeout(Duration::from_millis(20));
    config.retry.max_retries = 0;
    let generator = Arc::new(ScriptedGenerator::new().with_delay(Duration::from_millis(500)));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("slow", "Slow", plan(1));

    let outcome = orch.run_stage("draft", &mut project).await.unwrap();

    assert_eq!(outcome.state, StageState::FailedBlocking);
    assert_eq!(outcome.attempts, 3);
    let report = outcome.report.unwrap();
    assert!(report
        .violations
        .iter()
        .any(|v| v.validator == ValidatorKind::Generation && v.scene_index == Some(0)));
    assert!(project.scenes().is_empty());
}

#[tokio::test]
async fn stages_run_in_order_only() {
    let generator = Arc::new(ScriptedGenerator::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("order", "Order", plan(1));

    let err = orch.run_stage("polish", &mut project).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::OutOfOrder { ref prerequisite, .. } if prerequisite == "draft"
    ));
    assert!(matches!(
        orch.run_stage("epilogue", &mut project).await,
        Err(PipelineError::UnknownStage(_))
    ));
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn cancelled_run_starts_nothing() {
    let generator = Arc::new(ScriptedGenerator::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("stop", "Stop", plan(2));

    orch.cancel();
    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(generator.calls().is_empty());
    assert_eq!(events(&project).last(), Some(&JournalEvent::Cancelled));
    assert_eq!(store.count("stop"), 1);
}

/// Cancels the run from inside its first call
struct CancellingGenerator {
    token: CancellationToken,
}

#[async_trait]
impl Generator for CancellingGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        self.token.cancel();
        Ok(GenerationOutput::new(prose(request.unit.index)).with_tokens(100, 200))
    }
}

#[tokio::test]
async fn cancellation_discards_in_flight_results() {
    let token = CancellationToken::new();
    let generator = Arc::new(CancellingGenerator { token: token.clone() });
    let orch = Orchestrator::new(lenient_pipeline().with_parallelism(1), generator, Arc::new(MemorySnapshotStore::new()))
        .unwrap()
        .with_cancellation(token);
    let mut project = orch.new_project("midway", "Midway", plan(3));

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(project.scenes().is_empty());
    // the finished call is paid for even though its text is dropped
    assert_eq!(project.budget().calls(), 1);
    assert!(project.budget().spent() > 0.0);
    assert_eq!(project.stage("draft").unwrap().state, StageState::Aborted);
}

#[tokio::test]
async fn zero_wall_clock_budget_aborts_immediately() {
    let config = lenient_pipeline().with_wall_clock_budget(Duration::ZERO);
    let generator = Arc::new(ScriptedGenerator::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("late", "Late", plan(1));

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert!(generator.calls().is_empty());
    assert_eq!(events(&project).last(), Some(&JournalEvent::Aborted));
}

#[tokio::test]
async fn resume_repairs_the_stage_that_wrote_the_duplicate() {
    let light = StageProfile::of([WeightedValidator::new(ValidatorKind::Continuity)]);
    let strict = StageProfile::of([
        WeightedValidator::new(ValidatorKind::Duplication),
        WeightedValidator::new(ValidatorKind::Continuity),
    ]);
    let config = lenient_pipeline().with_gate(
        lenient_gate()
            .with_stage("draft", light.clone())
            .with_stage("polish", light)
            .with_stage("audit", strict),
    );
    // polish hands both scenes back unchanged, so draft stays their origin
    let generator = Arc::new(
        ScriptedGenerator::new()
            .text("draft", 1, &prose(0))
            .text("draft", 1, &prose(1))
            .text("polish", 0, &prose(0))
            .text("polish", 1, &prose(0))
            .text("polish", 1, &prose(1)),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(config, &generator, &store);
    let mut project = orch.new_project("twins", "Twins", plan(2));

    let first = orch.run(&mut project).await.unwrap();
    assert_eq!(first.status, RunStatus::Blocked);
    assert_eq!(project.stage("audit").unwrap().state, StageState::FailedBlocking);
    let plan = first.quality.repair_plan.unwrap();
    assert_eq!(plan.units_for("draft").into_iter().collect::<Vec<_>>(), vec![1]);

    let (resumed, summary) = orch.resume("twins").await.unwrap();

    assert_eq!(summary.status, RunStatus::Complete);
    assert_eq!(generator.calls_for("draft", 0), 1);
    assert_eq!(generator.calls_for("draft", 1), 2);
    assert_eq!(resumed.scene(1).unwrap().text(), prose(1));
    let log = events(&resumed);
    assert!(log.contains(&JournalEvent::Resumed));
    assert!(log.contains(&JournalEvent::RepairEntered));

    let snapshots = store.list_snapshots("twins").await.unwrap();
    let indices: Vec<_> = snapshots.iter().map(|s| (s.stage_index, s.repair)).collect();
    assert_eq!(indices, vec![(0, false), (1, false), (2, false), (0, true), (1, true), (2, false)]);
    for pair in snapshots.windows(2) {
        assert!(pair[1].stage_index >= pair[0].stage_index || pair[1].repair);
    }
}

#[tokio::test]
async fn file_snapshots_restore_scenes_and_bible() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let generator = Arc::new(
        ScriptedGenerator::new().reply(
            "draft",
            0,
            Ok(GenerationOutput::new(prose(0))
                .with_mention(EntityKind::Character, json!({"name": "Ilse", "role": "protagonist"}))
                .with_mention(EntityKind::Thread, json!({"label": "the debt"}))),
        ),
    );
    let store = Arc::new(FileSnapshotStore::new(dir.path()));
    let orch = Orchestrator::new(lenient_pipeline(), Arc::clone(&generator) as Arc<dyn Generator>, store)?;
    let mut project = orch.new_project("ledger", "Ledger", plan(2));

    orch.run(&mut project).await?;
    let (restored, summary) = orch.resume("ledger").await?;

    assert_eq!(summary.status, RunStatus::Complete);
    assert_eq!(restored.scenes(), project.scenes());
    assert_eq!(restored.registry(), project.registry());
    let ilse = restored
        .registry()
        .character("Ilse")
        .ok_or_else(|| anyhow::anyhow!("Ilse missing from restored bible"))?;
    assert_eq!(ilse.first_appearance, 0);

    let manifest = summary.manifest.ok_or_else(|| anyhow::anyhow!("no manifest"))?;
    assert_eq!(manifest.characters[0].name, "Ilse");
    assert_eq!(manifest.unresolved_threads[0].label, "the debt");
    Ok(())
}

#[tokio::test]
async fn long_silence_marks_the_thread_dropped() {
    let generator = Arc::new(ScriptedGenerator::new().reply(
        "draft",
        0,
        Ok(GenerationOutput::new(prose(0)).with_mention(EntityKind::Thread, json!({"label": "the debt"}))),
    ));
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline().with_drop_window(10), &generator, &store);
    let mut project = orch.new_project("silence", "Silence", plan(13));

    let summary = orch.run(&mut project).await.unwrap();

    assert_eq!(summary.status, RunStatus::Complete);
    let thread = &summary.manifest.unwrap().unresolved_threads[0];
    assert_eq!(thread.last_referenced, 0);
    assert!(thread.dropped);
}

#[tokio::test]
async fn role_conflict_costs_score_but_not_the_stage() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .reply(
                "draft",
                0,
                Ok(GenerationOutput::new(prose(0))
                    .with_mention(EntityKind::Character, json!({"name": "Tomas", "role": "ally"}))),
            )
            .reply(
                "draft",
                1,
                Ok(GenerationOutput::new(prose(1))
                    .with_mention(EntityKind::Character, json!({"name": "Tomas", "role": "antagonist"}))),
            ),
    );
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(lenient_pipeline(), &generator, &store);
    let mut project = orch.new_project("tomas", "Tomas", plan(2));

    let outcome = orch.run_stage("draft", &mut project).await.unwrap();

    let report = outcome.report.unwrap();
    assert!(report.score_of(ValidatorKind::Continuity).unwrap() < 1.0);
    assert!(report
        .violations
        .iter()
        .any(|v| v.validator == ValidatorKind::Continuity && v.scene_index == Some(1)));
    assert_eq!(
        project.registry().character("Tomas").unwrap().role,
        novella_bible::Role::Ally
    );
}
