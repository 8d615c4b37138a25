//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{Agent, AgentRole, AgentState, AgentStatus, TaskId};
use crate::domain::ports::AgentRepository;

use super::swarm_repository::parse_timestamp;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    swarm_id: String,
    role: String,
    status: String,
    current_task_id: Option<String>,
    data: String,
    assigned_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = OrchestratorError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrchestratorError::Internal(format!("bad agent id: {e}")))?,
            swarm_id: Uuid::parse_str(&row.swarm_id)
                .map_err(|e| OrchestratorError::Internal(format!("bad swarm id: {e}")))?,
            role: AgentRole::from_str(&row.role)
                .ok_or_else(|| OrchestratorError::Internal(format!("bad role: {}", row.role)))?,
            state: AgentState {
                status: AgentStatus::from_str(&row.status).ok_or_else(|| {
                    OrchestratorError::Internal(format!("bad agent status: {}", row.status))
                })?,
                current_task_id: row.current_task_id.map(TaskId::new),
                data: serde_json::from_str(&row.data)?,
            },
            assigned_at: parse_timestamp(&row.assigned_at)?,
        })
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        let data_json = serde_json::to_string(&agent.state.data)?;

        sqlx::query(
            "INSERT INTO agents (id, swarm_id, role, status, current_task_id, data, assigned_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.id.to_string())
        .bind(agent.swarm_id.to_string())
        .bind(agent.role.as_str())
        .bind(agent.state.status.as_str())
        .bind(agent.state.current_task_id.as_ref().map(|t| t.0.clone()))
        .bind(&data_json)
        .bind(agent.assigned_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Agent::try_from).transpose()
    }

    async fn list_by_swarm(&self, swarm_id: Uuid) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> =
            sqlx::query_as("SELECT * FROM agents WHERE swarm_id = ? ORDER BY assigned_at ASC")
                .bind(swarm_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn update_state(&self, id: Uuid, state: &AgentState) -> DomainResult<()> {
        let data_json = serde_json::to_string(&state.data)?;

        let result = sqlx::query(
            "UPDATE agents SET status = ?, current_task_id = ?, data = ? WHERE id = ?",
        )
        .bind(state.status.as_str())
        .bind(state.current_task_id.as_ref().map(|t| t.0.clone()))
        .bind(&data_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Internal(format!("agent {id} not found")));
        }
        Ok(())
    }
}
