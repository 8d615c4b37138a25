//! Single-task execution by a role-scoped agent.
//!
//! The runner holds the role's workspace lock for the duration of the LLM
//! call, parses the structured output, and records token spend. Failure
//! classification is the caller's job.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{Agent, AgentOutput, Task};
use crate::infrastructure::llm::LlmGateway;

use super::conflict_resolver::ConflictResolver;
use super::cost_tracker::CostTracker;

/// Executes one task under one agent.
pub struct AgentRunner {
    gateway: Arc<LlmGateway>,
    conflicts: Arc<ConflictResolver>,
    cost: Arc<CostTracker>,
}

impl AgentRunner {
    pub fn new(
        gateway: Arc<LlmGateway>,
        conflicts: Arc<ConflictResolver>,
        cost: Arc<CostTracker>,
    ) -> Self {
        Self { gateway, conflicts, cost }
    }

    /// The exclusive workspace path a role writes into, scoped per swarm so
    /// concurrent swarms never contend.
    fn workspace_path(swarm_id: Uuid, agent: &Agent) -> String {
        format!("{swarm_id}/workspace/{}", agent.role.as_str())
    }

    /// Execute the task and return the parsed output.
    ///
    /// `task` must be the freshly loaded row: on a retry its `last_error`
    /// carries the previous failure, which the role prompt injects so the
    /// model regenerates around it.
    pub async fn execute(
        &self,
        swarm_id: Uuid,
        agent: &Agent,
        task: &Task,
        scope_summary: &str,
    ) -> DomainResult<AgentOutput> {
        let path = Self::workspace_path(swarm_id, agent);
        let acquired = self.conflicts.acquire_lock(swarm_id, &path, agent.id).await?;
        if !acquired {
            return Err(OrchestratorError::Internal(format!(
                "workspace {path} is locked by another agent"
            )));
        }

        let result = self.run_llm(swarm_id, agent, task, scope_summary).await;

        // Release regardless of outcome; on failure the caller also runs
        // on_task_failed, which is a no-op for already-released locks.
        self.conflicts.release_lock(swarm_id, &path, agent.id).await?;

        result
    }

    async fn run_llm(
        &self,
        swarm_id: Uuid,
        agent: &Agent,
        task: &Task,
        scope_summary: &str,
    ) -> DomainResult<AgentOutput> {
        let request = crate::domain::ports::CompletionRequest::new(
            agent.role.build_prompt(task, scope_summary),
        )
        .with_system(agent.role.prompt_preamble());

        let (output, response) = self.gateway.complete_json::<AgentOutput>(request).await?;
        self.cost.record(swarm_id, response.tokens_used);

        tracing::debug!(
            task_id = %task.id,
            role = %agent.role,
            tokens = response.tokens_used,
            "Task execution completed"
        );

        Ok(output)
    }
}
