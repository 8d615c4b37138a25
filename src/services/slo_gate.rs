//! SLO enforcement at workflow completion.
//!
//! Cost breaches fail hard; coverage fails retryable; latency and stack
//! confidence only warn. All results are appended to the workflow output
//! and emitted as events and metrics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::config::SloConfig;
use crate::domain::models::{EventKind, SwarmEvent};
use crate::domain::ports::metrics::names;
use crate::domain::ports::{EventRepository, MetricsSink};

/// What a breach of one SLO does to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloOutcome {
    Pass,
    Warn,
    FailRetryable,
    FailHard,
}

/// One evaluated SLO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloResult {
    pub slo: String,
    pub actual: f64,
    pub threshold: f64,
    pub outcome: SloOutcome,
}

/// Full gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloReport {
    pub results: Vec<SloResult>,
}

impl SloReport {
    pub fn hard_breach(&self) -> Option<&SloResult> {
        self.results.iter().find(|r| r.outcome == SloOutcome::FailHard)
    }

    pub fn retryable_breach(&self) -> Option<&SloResult> {
        self.results
            .iter()
            .find(|r| r.outcome == SloOutcome::FailRetryable)
    }

    pub fn all_green(&self) -> bool {
        self.results.iter().all(|r| r.outcome == SloOutcome::Pass)
    }
}

/// Measured inputs for one workflow run.
#[derive(Debug, Clone, Default)]
pub struct SloInputs {
    pub cost_usd: f64,
    pub latency_seconds: f64,
    /// Reported test coverage, when the test gate produced one
    pub coverage_pct: Option<f64>,
    /// Stack inference confidence, when inference ran
    pub stack_confidence: Option<f64>,
}

/// Evaluates workflow SLOs and records breaches.
pub struct SloGate {
    config: SloConfig,
    events: Arc<dyn EventRepository>,
    metrics: Arc<dyn MetricsSink>,
}

impl SloGate {
    pub fn new(
        config: SloConfig,
        events: Arc<dyn EventRepository>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self { config, events, metrics }
    }

    /// Evaluate all SLOs, append breach events, and return the report.
    ///
    /// The caller converts a hard breach into workflow failure; this method
    /// never returns an error for breaches themselves.
    pub async fn evaluate(&self, swarm_id: Uuid, inputs: &SloInputs) -> DomainResult<SloReport> {
        let mut results = Vec::new();

        results.push(SloResult {
            slo: "cost_usd".to_string(),
            actual: inputs.cost_usd,
            threshold: self.config.cost_usd,
            outcome: if inputs.cost_usd <= self.config.cost_usd {
                SloOutcome::Pass
            } else {
                SloOutcome::FailHard
            },
        });

        results.push(SloResult {
            slo: "latency_seconds".to_string(),
            actual: inputs.latency_seconds,
            threshold: self.config.latency_seconds,
            outcome: if inputs.latency_seconds <= self.config.latency_seconds {
                SloOutcome::Pass
            } else {
                SloOutcome::Warn
            },
        });

        if let Some(coverage) = inputs.coverage_pct {
            results.push(SloResult {
                slo: "coverage_pct".to_string(),
                actual: coverage,
                threshold: self.config.coverage_pct,
                outcome: if coverage >= self.config.coverage_pct {
                    SloOutcome::Pass
                } else {
                    SloOutcome::FailRetryable
                },
            });
        }

        if let Some(confidence) = inputs.stack_confidence {
            results.push(SloResult {
                slo: "stack_confidence".to_string(),
                actual: confidence,
                threshold: self.config.confidence_min,
                outcome: if confidence >= self.config.confidence_min {
                    SloOutcome::Pass
                } else {
                    SloOutcome::Warn
                },
            });
        }

        for result in &results {
            if result.outcome != SloOutcome::Pass {
                tracing::warn!(
                    slo = %result.slo,
                    actual = result.actual,
                    threshold = result.threshold,
                    outcome = ?result.outcome,
                    "SLO breach"
                );
                self.events
                    .append(&SwarmEvent::new(
                        swarm_id,
                        EventKind::SloBreach,
                        json!({
                            "slo": result.slo,
                            "actual": result.actual,
                            "threshold": result.threshold,
                            "outcome": result.outcome,
                        }),
                    ))
                    .await?;
            }
        }

        // Duration is recorded here rather than at finalize so failed
        // workflows contribute to the histogram too.
        self.metrics
            .observe_histogram(names::WORKFLOW_DURATION_SECONDS, inputs.latency_seconds);

        Ok(SloReport { results })
    }

    /// The error a hard breach converts into.
    pub fn breach_error(result: &SloResult) -> OrchestratorError {
        OrchestratorError::SloBreach {
            slo: result.slo.clone(),
            actual: result.actual,
            threshold: result.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> SloInputs {
        SloInputs {
            cost_usd: 1.0,
            latency_seconds: 100.0,
            coverage_pct: Some(96.0),
            stack_confidence: Some(0.9),
        }
    }

    fn report(results: Vec<SloResult>) -> SloReport {
        SloReport { results }
    }

    #[test]
    fn test_hard_breach_lookup() {
        let r = report(vec![SloResult {
            slo: "cost_usd".into(),
            actual: 6.0,
            threshold: 5.0,
            outcome: SloOutcome::FailHard,
        }]);
        assert!(r.hard_breach().is_some());
        assert!(r.retryable_breach().is_none());
        assert!(!r.all_green());
    }

    #[test]
    fn test_breach_error_shape() {
        let result = SloResult {
            slo: "cost_usd".into(),
            actual: 6.0,
            threshold: 5.0,
            outcome: SloOutcome::FailHard,
        };
        let err = SloGate::breach_error(&result);
        assert!(matches!(err, OrchestratorError::SloBreach { ref slo, .. } if slo == "cost_usd"));
    }

    #[test]
    fn test_inputs_default_omit_optionals() {
        let i = SloInputs::default();
        assert!(i.coverage_pct.is_none());
        assert!(i.stack_confidence.is_none());
        let _ = inputs();
    }
}
