//! Quality gate orchestration
//!
//! Runs a stage's validator subset in parallel, combines weighted scores,
//! applies blocking and scored thresholds and, on failure, maps every
//! violation back to the stage responsible for the offending scene.

use crate::config::GateConfig;
use crate::report::{QualityReport, RepairEntry, RepairPlan, ThresholdBreach, Verdict};
use novella_scene::Scene;
use novella_validators::{Severity, ValidationContext, ValidatorKind, ValidatorResult, Violation};
use rayon::prelude::*;

/// Weighted pass/fail decision over validator results
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: GateConfig,
}

impl QualityGate {
    /// Create gate
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate one stage attempt.
    ///
    /// Deterministic: equal inputs give an equal report.
    #[must_use]
    pub fn evaluate_stage(
        &self,
        stage: &str,
        units: &[&Scene],
        ctx: &ValidationContext<'_>,
    ) -> QualityReport {
        let profile = self.config.profile(stage);
        let settings = &self.config.validators;

        let results: Vec<(f64, Option<f64>, ValidatorResult)> = profile
            .validators
            .par_iter()
            .filter_map(|wv| {
                let validator = settings.build(wv.validator)?;
                Some((wv.weight, wv.min_score, validator.evaluate(units, ctx)))
            })
            .collect();

        let total_weight: f64 = results.iter().map(|(w, _, _)| w).sum();
        let overall_score = if total_weight > 0.0 {
            results.iter().map(|(w, _, r)| w * r.score).sum::<f64>() / total_weight
        } else {
            1.0
        };

        let mut violated_thresholds = Vec::new();
        if overall_score < self.config.pass_threshold {
            violated_thresholds.push(ThresholdBreach {
                validator: None,
                actual: overall_score,
                required: self.config.pass_threshold,
            });
        }
        for (_, min, r) in &results {
            if let Some(min) = min {
                if r.score < *min {
                    violated_thresholds.push(ThresholdBreach {
                        validator: Some(r.validator),
                        actual: r.score,
                        required: *min,
                    });
                }
            }
        }

        let mut violations: Vec<Violation> = results
            .iter()
            .flat_map(|(_, _, r)| r.violations.iter().cloned())
            .collect();
        violations.extend(ctx.failures.iter().map(|f| {
            let v = if f.retryable {
                Violation::scored(
                    ValidatorKind::Generation,
                    format!("generation failed after retries: {}", f.reason),
                )
            } else {
                Violation::blocking(
                    ValidatorKind::Generation,
                    format!("generation refused: {}", f.reason),
                )
            };
            v.at_scene(f.scene_index)
        }));
        let missing_units = ctx.failures.iter().any(|f| f.retryable);

        let verdict = if violations.iter().any(Violation::is_blocking) {
            Verdict::FailedBlocking
        } else if violated_thresholds.is_empty() && !missing_units {
            Verdict::Passed
        } else {
            Verdict::FailedRetryable
        };

        let repair_plan = (!verdict.is_pass()).then(|| {
            build_repair_plan(stage, units, ctx, &violations, &violated_thresholds, &results)
        });

        let report = QualityReport {
            stage: stage.to_string(),
            units: units.iter().map(|s| s.index).collect(),
            overall_score,
            results: results.into_iter().map(|(_, _, r)| r).collect(),
            violations,
            violated_thresholds,
            verdict,
            repair_plan,
        };

        tracing::info!(
            stage,
            units = report.units.len(),
            score = report.overall_score,
            verdict = %report.verdict,
            violations = report.violations.len(),
            "Stage evaluated"
        );
        report
    }
}

/// Map violations to the stages that produced the offending scenes
fn build_repair_plan(
    stage: &str,
    units: &[&Scene],
    ctx: &ValidationContext<'_>,
    violations: &[Violation],
    breaches: &[ThresholdBreach],
    results: &[(f64, Option<f64>, ValidatorResult)],
) -> RepairPlan {
    // Units carry the freshest revision; fall back to project scenes
    let origin = |index: usize| -> String {
        units
            .iter()
            .find(|s| s.index == index)
            .copied()
            .or_else(|| ctx.scene(index))
            .map_or_else(|| stage.to_string(), |s| s.origin_stage().to_string())
    };

    let mut entries: Vec<RepairEntry> = violations
        .iter()
        .map(|v| RepairEntry {
            stage: v.scene_index.map_or_else(|| stage.to_string(), origin),
            scene_index: v.scene_index,
            validator: v.validator,
            severity: v.severity,
            reason: v.message.clone(),
            hard_stop: v.validator == ValidatorKind::Generation && v.is_blocking(),
        })
        .collect();

    // A breach with no located finding still needs a target; the overall
    // threshold falls on the weakest validator
    let weakest = results
        .iter()
        .map(|(_, _, r)| r)
        .min_by(|a, b| a.score.total_cmp(&b.score))
        .map(|r| r.validator);
    for breach in breaches {
        let Some(kind) = breach.validator.or(weakest) else {
            continue;
        };
        if !entries.iter().any(|e| e.validator == kind) {
            entries.push(RepairEntry {
                stage: stage.to_string(),
                scene_index: None,
                validator: kind,
                severity: Severity::Scored,
                reason: breach.to_string(),
                hard_stop: false,
            });
        }
    }
    RepairPlan::new(entries)
}
