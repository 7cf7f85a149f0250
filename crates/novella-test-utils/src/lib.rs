//! Testing utilities for the Novella workspace
//!
//! Scripted generator, prose fixtures and pipeline builders.

#![allow(missing_docs)]

use async_trait::async_trait;
use novella_core::{
    GenerationError, GenerationOutput, GenerationRequest, Generator, PipelineConfig, PlannedUnit,
    StoryPlan,
};
use novella_gate::{GateConfig, StageProfile, WeightedValidator};
use novella_kernel::budget::ModelTier;
use novella_validators::ValidatorKind;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Prose no other scene shares a word with: every token carries the index
#[must_use]
pub fn prose(index: usize) -> String {
    const WORDS: [&str; 12] = [
        "harbor", "lantern", "ledger", "bridge", "orchard", "signal", "winter", "archive",
        "market", "compass", "tower", "river",
    ];
    let sentence = |offset: usize| {
        (0..6)
            .map(|i| format!("{}{index}", WORDS[(offset + i) % WORDS.len()]))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "{}.\n\n{}.\n\n{}.",
        sentence(0),
        sentence(4),
        sentence(8)
    )
}

/// Third-person narration with one first-person paragraph
pub const POV_SLIP: &str = "She crossed the square before the bells.\n\n\
He followed her at a distance, counting the lamps.\n\n\
I knew then that the square was never empty.";

/// Third-person narration throughout
pub const POV_CLEAN: &str = "She crossed the square before the bells.\n\n\
He followed her at a distance, counting the lamps.\n\n\
They both knew the square was never empty.";

/// Chapter-one text with no goal, conflict, turn or inciting event
pub const FLAT: &str = "The room was grey. A lamp sat on the table.\n\n\
The clock on the wall was quiet. Dust lay on the shelf.";

/// Plan of `n` units, all in chapter 2 so the chapter-one rule stays out of the way
#[must_use]
pub fn plan(n: usize) -> StoryPlan {
    StoryPlan::new((0..n).map(|i| PlannedUnit::new(i, format!("unit {i}")).at(2, 1)))
}

/// Gate that scores only continuity and duplication in every stage
#[must_use]
pub fn lenient_gate() -> GateConfig {
    let profile = StageProfile::of([
        WeightedValidator::new(ValidatorKind::Continuity),
        WeightedValidator::new(ValidatorKind::Duplication),
    ]);
    let audit = StageProfile::of([
        WeightedValidator::new(ValidatorKind::MotifEvolution).with_min_score(0.5),
        WeightedValidator::new(ValidatorKind::Continuity),
        WeightedValidator::new(ValidatorKind::Duplication),
    ]);
    GateConfig::default()
        .with_stage("draft", profile.clone())
        .with_stage("polish", profile)
        .with_stage("audit", audit)
}

/// Default stages with the lenient gate and no backoff delay
#[must_use]
pub fn lenient_pipeline() -> PipelineConfig {
    let mut config = PipelineConfig::default().with_gate(lenient_gate());
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 1;
    config
}

/// One recorded generator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub stage: String,
    pub unit: usize,
    pub attempt: u32,
    pub tier: ModelTier,
    pub repair_reasons: Vec<String>,
}

type Reply = Result<GenerationOutput, GenerationError>;

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<(String, usize), VecDeque<Reply>>,
    calls: Vec<CallRecord>,
}

/// Generator answering from a per-(stage, unit) script.
///
/// Queued replies are served in order and the last one repeats. Units
/// without a script get [`prose`] for their index.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
    tokens: (u64, u64),
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens charged by default replies
    #[must_use]
    pub fn with_tokens(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens = (tokens_in, tokens_out);
        self
    }

    /// Sleep before every reply
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a reply for `unit` in `stage`
    #[must_use]
    pub fn reply(self, stage: &str, unit: usize, reply: Reply) -> Self {
        self.script
            .lock()
            .replies
            .entry((stage.to_string(), unit))
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a text reply
    #[must_use]
    pub fn text(self, stage: &str, unit: usize, text: &str) -> Self {
        let output = GenerationOutput::new(text).with_tokens(self.tokens.0, self.tokens.1);
        self.reply(stage, unit, Ok(output))
    }

    /// Queue a failure
    #[must_use]
    pub fn fail(self, stage: &str, unit: usize, error: GenerationError) -> Self {
        self.reply(stage, unit, Err(error))
    }

    /// Every call so far
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.script.lock().calls.clone()
    }

    /// Calls made for `unit` in `stage`
    #[must_use]
    pub fn calls_for(&self, stage: &str, unit: usize) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.stage == stage && c.unit == unit)
            .count()
    }

    /// Calls made in `stage`
    #[must_use]
    pub fn calls_in(&self, stage: &str) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.stage == stage)
            .count()
    }

    fn next_reply(&self, request: &GenerationRequest) -> Reply {
        let mut script = self.script.lock();
        script.calls.push(CallRecord {
            stage: request.stage.clone(),
            unit: request.unit.index,
            attempt: request.attempt,
            tier: request.tier,
            repair_reasons: request.repair_reasons.clone(),
        });

        let key = (request.stage.clone(), request.unit.index);
        match script.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| self.default_reply(request)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.default_reply(request)),
            None => self.default_reply(request),
        }
    }

    fn default_reply(&self, request: &GenerationRequest) -> Reply {
        let text = format!("{}\n\nEdited{} {}.", prose(request.unit.index), request.unit.index, request.stage);
        Ok(GenerationOutput::new(text)
            .with_tokens(self.tokens.0, self.tokens.1)
            .with_tier(request.tier))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let reply = self.next_reply(&request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}
