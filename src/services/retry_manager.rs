//! Error classification and retry policy selection.
//!
//! Classification is deterministic: variant matches first, then a substring
//! table over the error message. Each kind maps to a fixed policy; policy
//! exhaustion leaves the task failed and, when only user input can resolve
//! it, produces an escalation.

use std::time::Duration;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{EscalationKind, Task};
use crate::domain::ports::metrics::names;
use crate::domain::ports::MetricsSink;

/// The error taxonomy the orchestrator recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, timeout, 5xx, rate limits
    Transient,
    /// Syntax/type/import errors in a generated artifact
    RecoverableCode,
    /// Missing secret, bad API key
    Configuration,
    /// Cycle, contradictory spec
    DesignFlaw,
    /// Upstream service down
    ExternalBlocker,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RecoverableCode => "recoverable_code",
            Self::Configuration => "configuration",
            Self::DesignFlaw => "design_flaw",
            Self::ExternalBlocker => "external_blocker",
        }
    }

    /// Maximum retry attempts for this kind.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Transient => 5,
            Self::RecoverableCode | Self::DesignFlaw => 2,
            Self::Configuration | Self::ExternalBlocker => 0,
        }
    }

    /// Which escalation to open when the policy is exhausted, if any.
    pub fn escalation_kind(&self) -> Option<EscalationKind> {
        match self {
            Self::Configuration => Some(EscalationKind::Configuration),
            Self::ExternalBlocker => Some(EscalationKind::ExternalService),
            Self::DesignFlaw => Some(EscalationKind::DesignDecision),
            Self::Transient | Self::RecoverableCode => None,
        }
    }
}

/// Substring patterns checked, in order, against lowercased error text.
const MESSAGE_PATTERNS: &[(&str, ErrorKind)] = &[
    ("missing secret", ErrorKind::Configuration),
    ("api key", ErrorKind::Configuration),
    ("unauthorized", ErrorKind::Configuration),
    ("forbidden", ErrorKind::Configuration),
    ("upstream service", ErrorKind::ExternalBlocker),
    ("service down", ErrorKind::ExternalBlocker),
    // Both the prose spellings and the runtime exception names
    ("syntax", ErrorKind::RecoverableCode),
    ("type error", ErrorKind::RecoverableCode),
    ("typeerror", ErrorKind::RecoverableCode),
    ("import error", ErrorKind::RecoverableCode),
    ("importerror", ErrorKind::RecoverableCode),
    ("cannot find module", ErrorKind::RecoverableCode),
    ("undefined reference", ErrorKind::RecoverableCode),
    ("contradict", ErrorKind::DesignFlaw),
    ("cycle", ErrorKind::DesignFlaw),
    ("network", ErrorKind::Transient),
    ("timeout", ErrorKind::Transient),
    ("timed out", ErrorKind::Transient),
    ("connection", ErrorKind::Transient),
];

/// What the caller should do with a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Send the task back to pending after the given delay
    Retry { kind: ErrorKind, after: Duration, attempt: u32 },
    /// Open an escalation; the task stays failed until resolution
    Escalate {
        kind: ErrorKind,
        escalation: EscalationKind,
        suggested_actions: Vec<String>,
    },
    /// Policy exhausted and nothing a human can supply would help
    GiveUp { kind: ErrorKind },
}

/// Selects retry policy by error taxonomy.
pub struct RetryManager {
    metrics: std::sync::Arc<dyn MetricsSink>,
    /// Base delay for transient backoff
    base_delay: Duration,
    /// Backoff ceiling
    max_delay: Duration,
}

impl RetryManager {
    pub fn new(metrics: std::sync::Arc<dyn MetricsSink>) -> Self {
        Self {
            metrics,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Override the backoff window (tests use millisecond delays).
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Deterministically classify an error.
    ///
    /// Variant matches first; provider and execution errors carry their
    /// cause in the message, so they fall through to the substring table
    /// (a 401's "api key" text is configuration, not transient).
    pub fn classify(error: &OrchestratorError) -> ErrorKind {
        match error {
            OrchestratorError::RateLimited { .. }
            | OrchestratorError::StorageUnavailable(_)
            | OrchestratorError::ConcurrencyConflict { .. }
            | OrchestratorError::TaskTimeout(_) => ErrorKind::Transient,
            OrchestratorError::CycleDetected(_) | OrchestratorError::InvalidPlan(_) => {
                ErrorKind::DesignFlaw
            }
            other => Self::classify_message(&other.to_string()),
        }
    }

    /// Substring table over the message for errors whose variant is not
    /// decisive (agent execution failures arrive as `Internal`).
    pub fn classify_message(message: &str) -> ErrorKind {
        let lower = message.to_lowercase();
        for (pattern, kind) in MESSAGE_PATTERNS {
            if lower.contains(pattern) {
                return *kind;
            }
        }
        ErrorKind::Transient
    }

    /// Exponential backoff for a given attempt: `base * 2^(attempt-1)`,
    /// capped.
    pub fn backoff_for(&self, kind: ErrorKind, attempt: u32) -> Duration {
        match kind {
            ErrorKind::Transient | ErrorKind::RecoverableCode | ErrorKind::DesignFlaw => {
                let exp = attempt.saturating_sub(1).min(31);
                let delay = self
                    .base_delay
                    .saturating_mul(2_u32.saturating_pow(exp));
                delay.min(self.max_delay)
            }
            ErrorKind::Configuration | ErrorKind::ExternalBlocker => Duration::ZERO,
        }
    }

    /// The attempt budget for a task judged by its stored failure text.
    ///
    /// This is the monitor's view of the same cap `decide` applies: the
    /// original error value is gone by tick time, but its message survives
    /// in `task.last_error` and classification is deterministic over it.
    /// A task the policy has given up on never becomes eligible again.
    pub fn budget_for(&self, task: &Task) -> u32 {
        let kind = task
            .last_error
            .as_deref()
            .map_or(ErrorKind::Transient, Self::classify_message);
        kind.max_attempts().min(task.max_attempts)
    }

    /// Decide what to do about a failed task.
    ///
    /// `task.attempts` counts executions already made; the per-kind budget
    /// caps further ones (never exceeding the task's own `max_attempts`).
    pub fn decide(&self, task: &Task, error: &OrchestratorError) -> RetryDecision {
        let kind = Self::classify(error);
        let budget = kind.max_attempts().min(task.max_attempts);

        if task.attempts < budget {
            self.metrics.incr_counter(
                names::TASK_RETRIES_TOTAL,
                1,
                &[("kind", kind.as_str())],
            );
            return RetryDecision::Retry {
                kind,
                after: self.backoff_for(kind, task.attempts),
                attempt: task.attempts,
            };
        }

        match kind.escalation_kind() {
            Some(escalation) => RetryDecision::Escalate {
                kind,
                escalation,
                suggested_actions: Self::suggested_actions(kind, error),
            },
            None => RetryDecision::GiveUp { kind },
        }
    }

    fn suggested_actions(kind: ErrorKind, error: &OrchestratorError) -> Vec<String> {
        match kind {
            ErrorKind::Configuration => vec![
                "Provide the missing credential or secret".to_string(),
                format!("Verify configuration related to: {error}"),
            ],
            ErrorKind::ExternalBlocker => vec![
                "Wait for the upstream service to recover".to_string(),
                "Provide an alternative provider or endpoint".to_string(),
                "Mark the dependent feature as out of scope".to_string(),
            ],
            ErrorKind::DesignFlaw => vec![
                "Review the conflicting requirements and pick one".to_string(),
                "Allow the planner to regenerate the plan".to_string(),
            ],
            _ => Vec::new(),
        }
    }
}
