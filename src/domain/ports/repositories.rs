//! Repository ports for the durable state store.
//!
//! One trait per aggregate. All implementations must provide single-writer
//! semantics per row via the `version` column; a lost race surfaces as
//! `ConcurrencyConflict` and the caller re-reads and retries.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Agent, AgentState, Escalation, EscalationStatus, EventKind, StackTemplate, Swarm, SwarmEvent,
    SwarmStatus, Task, TaskId, TaskStatus,
};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub agent_id: Option<Uuid>,
}

/// Swarm persistence.
#[async_trait]
pub trait SwarmRepository: Send + Sync {
    async fn create(&self, swarm: &Swarm) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Swarm>>;

    async fn list(&self) -> DomainResult<Vec<Swarm>>;

    /// Compare-and-swap status update. The stored row must still be at
    /// `expected_version`; on mismatch returns `ConcurrencyConflict`.
    async fn update_status(
        &self,
        id: Uuid,
        status: SwarmStatus,
        expected_version: u64,
    ) -> DomainResult<()>;

    /// Replace swarm metadata (scope payload, workflow summary).
    async fn update_metadata(&self, id: Uuid, metadata: serde_json::Value) -> DomainResult<()>;

    /// Delete a swarm; agents and tasks cascade, events survive.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
}

/// Agent persistence.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    async fn list_by_swarm(&self, swarm_id: Uuid) -> DomainResult<Vec<Agent>>;

    async fn update_state(&self, id: Uuid, state: &AgentState) -> DomainResult<()>;
}

/// Task persistence. Tasks are keyed by `(swarm_id, task_id)`.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, swarm_id: Uuid, id: &TaskId) -> DomainResult<Option<Task>>;

    async fn list(&self, swarm_id: Uuid, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Full-row update guarded by the task's previous version.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Idempotent status update: applying the same `(task_id, status)` twice
    /// is a no-op. `data`, when given, is merged into the task's data object.
    async fn update_status(
        &self,
        swarm_id: Uuid,
        id: &TaskId,
        status: TaskStatus,
        data: Option<serde_json::Value>,
    ) -> DomainResult<()>;
}

/// Append-only event log.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Durable before returning.
    async fn append(&self, event: &SwarmEvent) -> DomainResult<()>;

    async fn by_kind(&self, swarm_id: Uuid, kind: EventKind) -> DomainResult<Vec<SwarmEvent>>;

    async fn by_swarm(&self, swarm_id: Uuid) -> DomainResult<Vec<SwarmEvent>>;
}

/// Escalation persistence.
#[async_trait]
pub trait EscalationRepository: Send + Sync {
    async fn create(&self, escalation: &Escalation) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Escalation>>;

    async fn list_by_swarm(
        &self,
        swarm_id: Uuid,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>>;

    async fn update(&self, escalation: &Escalation) -> DomainResult<()>;
}

/// Stack template storage with nearest-neighbor lookup.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Insert or update by title; seeding is idempotent.
    async fn upsert(&self, template: &StackTemplate) -> DomainResult<()>;

    async fn list(&self) -> DomainResult<Vec<StackTemplate>>;

    /// Top-k templates by cosine similarity, descending. Templates without
    /// embeddings are skipped.
    async fn nearest(&self, embedding: &[f32], k: usize)
        -> DomainResult<Vec<(StackTemplate, f64)>>;
}

/// Durable workflow activity results.
///
/// A step is complete once its checkpoint exists; restart replays from the
/// first missing step.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn save(
        &self,
        swarm_id: Uuid,
        step: &str,
        result: &serde_json::Value,
    ) -> DomainResult<()>;

    async fn get(&self, swarm_id: Uuid, step: &str) -> DomainResult<Option<serde_json::Value>>;

    async fn list_steps(&self, swarm_id: Uuid) -> DomainResult<Vec<String>>;
}
