//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so partial files work.

use crate::error::ConfigError;
use novella_gate::GateConfig;
use novella_kernel::budget::BudgetConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// What a stage does with the scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// One new scene per planned unit
    Draft,
    /// A new revision of every scene
    Revise,
    /// No generation; evaluation only
    Audit,
}

/// One stage of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub kind: StageKind,
}

impl StageDefinition {
    /// Create stage
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Exponential backoff for transient generation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first call (0 = a single call)
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stages in execution order
    pub stages: Vec<StageDefinition>,
    /// Attempts per stage before a retryable failure escalates
    pub max_attempts: u32,
    /// Concurrent generation calls within a stage
    pub parallelism: usize,
    pub call_timeout_ms: u64,
    /// Project-level wall-clock budget for `run`; `None` is unbounded
    pub wall_clock_budget_secs: Option<u64>,
    pub retry: RetryConfig,
    pub budget: BudgetConfig,
    pub gate: GateConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageDefinition::new("draft", StageKind::Draft),
                StageDefinition::new("polish", StageKind::Revise),
                StageDefinition::new("audit", StageKind::Audit),
            ],
            max_attempts: 3,
            parallelism: 4,
            call_timeout_ms: 120_000,
            wall_clock_budget_secs: None,
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Malformed TOML or inconsistent values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Unreadable file, malformed TOML or inconsistent values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// With stages
    #[inline]
    #[must_use]
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = StageDefinition>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    /// With max attempts per stage
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// With parallelism
    #[inline]
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With project wall-clock budget
    #[inline]
    #[must_use]
    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget_secs = Some(budget.as_secs());
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// With budget
    #[inline]
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// With gate configuration
    #[inline]
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// With the window after which an untouched thread counts as dropped
    #[inline]
    #[must_use]
    pub fn with_drop_window(mut self, window: usize) -> Self {
        self.gate.validators.continuity.drop_window = window;
        self
    }

    /// Dropped-thread window
    #[inline]
    #[must_use]
    pub fn drop_window(&self) -> usize {
        self.gate.validators.continuity.drop_window
    }

    /// Per-call timeout
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Wall-clock budget, if any
    #[inline]
    #[must_use]
    pub fn wall_clock_budget(&self) -> Option<Duration> {
        self.wall_clock_budget_secs.map(Duration::from_secs)
    }

    /// Position of `stage` in the pipeline
    #[must_use]
    pub fn stage_position(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == stage)
    }

    /// Check values are usable.
    ///
    /// # Errors
    /// The first inconsistent value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }
        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "max_attempts",
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Zero {
                field: "parallelism",
            });
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "call_timeout_ms",
            });
        }
        self.budget.validate()?;
        self.gate.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.stage_position("audit"), Some(2));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(3), Duration::from_millis(350));
    }

    #[test]
    fn rejects_duplicate_stage() {
        let config = PipelineConfig::default().with_stages([
            StageDefinition::new("draft", StageKind::Draft),
            StageDefinition::new("draft", StageKind::Revise),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateStage(name)) if name == "draft"
        ));
    }

    #[test]
    fn rejects_zero_parallelism() {
        let config = PipelineConfig::default().with_parallelism(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero { field: "parallelism" })
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            max_attempts = 2
            parallelism = 8

            [[stages]]
            name = "draft"
            kind = "draft"

            [[stages]]
            name = "line-edit"
            kind = "revise"

            [budget]
            ceiling = 500.0

            [gate]
            pass_threshold = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.stages[1].kind, StageKind::Revise);
        assert!((config.budget.ceiling - 500.0).abs() < f64::EPSILON);
        assert!((config.budget.low_balance_fraction - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn drop_window_proxies_gate_settings() {
        let config = PipelineConfig::default().with_drop_window(4);
        assert_eq!(config.drop_window(), 4);
        assert_eq!(config.gate.validators.continuity.drop_window, 4);
    }
}
