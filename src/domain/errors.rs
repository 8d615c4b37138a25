//! Domain errors for the Hivemind orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors recognized by the orchestrator core.
///
/// Everything a module boundary can fail with is enumerated here; errors
/// from lower layers (sqlx, serde) are converted at the adapter edge.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Swarm not found: {0}")]
    SwarmNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Escalation not found: {0}")]
    EscalationNotFound(Uuid),

    #[error("Escalation {0} already resolved")]
    EscalationAlreadyResolved(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("LLM returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Scope extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Dependency cycle detected involving task: {0}")]
    CycleDetected(String),

    #[error("Dependency failed for task {task_id}: {dependency_id}")]
    DependencyFailed { task_id: String, dependency_id: String },

    #[error("Task {0} timed out")]
    TaskTimeout(String),

    #[error("SLO breach: {slo} at {actual:.2} against threshold {threshold:.2}")]
    SloBreach { slo: String, actual: f64, threshold: f64 },

    #[error("Escalated: human input required ({kind})")]
    Escalated { kind: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Whether a retry could plausibly succeed without outside intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::ConcurrencyConflict { .. }
                | Self::LlmUnavailable(_)
                | Self::RateLimited { .. }
                | Self::TaskTimeout(_)
        )
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
