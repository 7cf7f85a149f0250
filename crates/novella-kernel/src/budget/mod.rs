//! Generation cost accounting
//!
//! A [`BudgetManager`] accumulates the cost of every generation call against
//! a ceiling:
//! - costs come from a per-tier rate table (cost units per 1k tokens)
//! - below the low-balance fraction it recommends the next cheaper tier
//! - once the ceiling is reached it reports `exhausted`
//!
//! Totals only ever grow.

use crate::error::BudgetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Model tier of a generation call, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Economy,
    Standard,
    #[default]
    Premium,
}

impl ModelTier {
    /// Next cheaper tier (`Economy` stays `Economy`)
    #[inline]
    #[must_use]
    pub fn cheaper(self) -> Self {
        match self {
            Self::Premium => Self::Standard,
            Self::Standard | Self::Economy => Self::Economy,
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Economy => "economy",
            Self::Standard => "standard",
            Self::Premium => "premium",
        };
        f.write_str(label)
    }
}

/// Cost units per 1k tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl TierRate {
    /// Cost of one call at this rate
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        (tokens_in as f64 / 1000.0) * self.input_per_1k
            + (tokens_out as f64 / 1000.0) * self.output_per_1k
    }
}

/// Budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Total cost units available to the project
    pub ceiling: f64,
    /// Remaining fraction under which a cheaper tier is recommended
    pub low_balance_fraction: f64,
    pub rates: BTreeMap<ModelTier, TierRate>,
    /// Tier requested for the first generation calls
    pub starting_tier: ModelTier,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let rates = BTreeMap::from([
            (
                ModelTier::Premium,
                TierRate {
                    input_per_1k: 3.0,
                    output_per_1k: 15.0,
                },
            ),
            (
                ModelTier::Standard,
                TierRate {
                    input_per_1k: 1.0,
                    output_per_1k: 5.0,
                },
            ),
            (
                ModelTier::Economy,
                TierRate {
                    input_per_1k: 0.25,
                    output_per_1k: 1.25,
                },
            ),
        ]);
        Self {
            ceiling: 10_000.0,
            low_balance_fraction: 0.15,
            rates,
            starting_tier: ModelTier::Premium,
        }
    }
}

impl BudgetConfig {
    /// Set ceiling
    #[inline]
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Set low-balance fraction
    #[inline]
    #[must_use]
    pub fn with_low_balance_fraction(mut self, fraction: f64) -> Self {
        self.low_balance_fraction = fraction;
        self
    }

    /// Set the rate for one tier
    #[inline]
    #[must_use]
    pub fn with_rate(mut self, tier: ModelTier, rate: TierRate) -> Self {
        self.rates.insert(tier, rate);
        self
    }

    /// Set starting tier
    #[inline]
    #[must_use]
    pub fn with_starting_tier(mut self, tier: ModelTier) -> Self {
        self.starting_tier = tier;
        self
    }

    /// Rate for `tier`, falling back to the built-in table
    #[must_use]
    pub fn rate(&self, tier: ModelTier) -> TierRate {
        self.rates
            .get(&tier)
            .copied()
            .or_else(|| Self::default().rates.get(&tier).copied())
            .unwrap_or(TierRate {
                input_per_1k: 0.0,
                output_per_1k: 0.0,
            })
    }

    /// Check values are usable.
    ///
    /// # Errors
    /// Non-positive ceiling, fraction outside [0, 1) or a negative rate.
    pub fn validate(&self) -> Result<(), BudgetError> {
        if !(self.ceiling.is_finite() && self.ceiling > 0.0) {
            return Err(BudgetError::InvalidCeiling(self.ceiling));
        }
        if !(0.0..1.0).contains(&self.low_balance_fraction) {
            return Err(BudgetError::InvalidLowBalanceFraction(
                self.low_balance_fraction,
            ));
        }
        for (tier, rate) in &self.rates {
            let ok = |v: f64| v.is_finite() && v >= 0.0;
            if !ok(rate.input_per_1k) || !ok(rate.output_per_1k) {
                return Err(BudgetError::InvalidRate {
                    tier: tier.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Result of a charge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Cost charged by this call (0 for a status query)
    pub charged: f64,
    /// Cost units left, never negative
    pub remaining: f64,
    pub exhausted: bool,
    /// Remaining balance is under the low-balance fraction
    pub low_balance: bool,
    /// Tier to use for subsequent calls
    pub recommended_tier: ModelTier,
}

/// Cumulative cost ledger of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetManager {
    config: BudgetConfig,
    spent: f64,
    tokens_in: u64,
    tokens_out: u64,
    calls: u64,
    spent_by_tier: BTreeMap<ModelTier, f64>,
    active_tier: ModelTier,
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

impl BudgetManager {
    /// Create ledger with nothing spent
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            active_tier: config.starting_tier,
            config,
            spent: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            calls: 0,
            spent_by_tier: BTreeMap::new(),
        }
    }

    /// Record one generation call and report the resulting balance
    pub fn charge(&mut self, tokens_in: u64, tokens_out: u64, tier: ModelTier) -> BudgetStatus {
        let was_low = self.status().low_balance;
        let cost = self.config.rate(tier).cost(tokens_in, tokens_out).max(0.0);

        self.spent += cost;
        self.tokens_in = self.tokens_in.saturating_add(tokens_in);
        self.tokens_out = self.tokens_out.saturating_add(tokens_out);
        self.calls = self.calls.saturating_add(1);
        *self.spent_by_tier.entry(tier).or_default() += cost;

        let mut status = self.status();
        status.charged = cost;
        if status.low_balance {
            let recommended = tier.cheaper().min(self.active_tier);
            if recommended != self.active_tier {
                tracing::warn!(
                    from = %self.active_tier,
                    to = %recommended,
                    remaining = status.remaining,
                    "Low budget balance, downgrading model tier"
                );
            }
            self.active_tier = recommended;
            status.recommended_tier = recommended;
        }
        if status.exhausted {
            tracing::error!(
                spent = self.spent,
                ceiling = self.config.ceiling,
                "Budget exhausted"
            );
        } else if status.low_balance && !was_low {
            tracing::warn!(remaining = status.remaining, "Budget balance is low");
        }
        status
    }

    /// Current balance without charging
    #[must_use]
    pub fn status(&self) -> BudgetStatus {
        let remaining = (self.config.ceiling - self.spent).max(0.0);
        BudgetStatus {
            charged: 0.0,
            remaining,
            exhausted: self.spent >= self.config.ceiling,
            low_balance: remaining <= self.config.ceiling * self.config.low_balance_fraction,
            recommended_tier: self.active_tier,
        }
    }

    /// Cost a call would incur
    #[inline]
    #[must_use]
    pub fn estimate(&self, tokens_in: u64, tokens_out: u64, tier: ModelTier) -> f64 {
        self.config.rate(tier).cost(tokens_in, tokens_out)
    }

    /// Whether the ceiling is reached
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.spent >= self.config.ceiling
    }

    /// Total cost spent
    #[inline]
    #[must_use]
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Cost units left
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (self.config.ceiling - self.spent).max(0.0)
    }

    /// Total input tokens charged
    #[inline]
    #[must_use]
    pub fn tokens_in(&self) -> u64 {
        self.tokens_in
    }

    /// Total output tokens charged
    #[inline]
    #[must_use]
    pub fn tokens_out(&self) -> u64 {
        self.tokens_out
    }

    /// Number of charged calls
    #[inline]
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Cost per tier
    #[inline]
    #[must_use]
    pub fn spent_by_tier(&self) -> &BTreeMap<ModelTier, f64> {
        &self.spent_by_tier
    }

    /// Tier to request for the next call
    #[inline]
    #[must_use]
    pub fn active_tier(&self) -> ModelTier {
        self.active_tier
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(ceiling: f64) -> BudgetManager {
        // 1 cost unit per token out, nothing for input
        let config = BudgetConfig::default().with_ceiling(ceiling).with_rate(
            ModelTier::Premium,
            TierRate {
                input_per_1k: 0.0,
                output_per_1k: 1000.0,
            },
        );
        BudgetManager::new(config)
    }

    #[test]
    fn charge_accumulates() {
        let mut budget = flat(1000.0);
        let status = budget.charge(50, 300, ModelTier::Premium);
        assert!((status.charged - 300.0).abs() < 1e-9);
        assert!((status.remaining - 700.0).abs() < 1e-9);
        assert!(!status.exhausted);
        assert_eq!(budget.tokens_in(), 50);
        assert_eq!(budget.calls(), 1);
    }

    #[test]
    fn overspend_exhausts() {
        let mut budget = flat(1000.0);
        let status = budget.charge(0, 1200, ModelTier::Premium);
        assert!(status.exhausted);
        assert!(status.remaining.abs() < f64::EPSILON);
        assert!(budget.is_exhausted());
        assert!((budget.spent() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn low_balance_recommends_cheaper_tier() {
        let mut budget = flat(1000.0);
        let status = budget.charge(0, 800, ModelTier::Premium);
        assert!(!status.low_balance);
        assert_eq!(status.recommended_tier, ModelTier::Premium);

        let status = budget.charge(0, 100, ModelTier::Premium);
        assert!(status.low_balance);
        assert_eq!(status.recommended_tier, ModelTier::Standard);
        assert_eq!(budget.active_tier(), ModelTier::Standard);
    }

    #[test]
    fn economy_stays_economy() {
        assert_eq!(ModelTier::Economy.cheaper(), ModelTier::Economy);
        assert_eq!(ModelTier::Premium.cheaper(), ModelTier::Standard);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(BudgetConfig::default().validate().is_ok());
        assert!(BudgetConfig::default().with_ceiling(0.0).validate().is_err());
        assert!(BudgetConfig::default()
            .with_low_balance_fraction(1.5)
            .validate()
            .is_err());
        let negative = BudgetConfig::default().with_rate(
            ModelTier::Economy,
            TierRate {
                input_per_1k: -1.0,
                output_per_1k: 0.0,
            },
        );
        assert!(matches!(
            negative.validate(),
            Err(BudgetError::InvalidRate { .. })
        ));
    }

    #[test]
    fn ledger_survives_json() {
        let mut budget = flat(1000.0);
        budget.charge(10, 20, ModelTier::Premium);
        let json = serde_json::to_string(&budget).unwrap();
        let back: BudgetManager = serde_json::from_str(&json).unwrap();
        assert_eq!(budget, back);
    }
}
