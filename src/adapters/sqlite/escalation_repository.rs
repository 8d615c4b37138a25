//! SQLite implementation of the EscalationRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    Escalation, EscalationKind, EscalationSeverity, EscalationStatus, TaskId,
};
use crate::domain::ports::EscalationRepository;

use super::swarm_repository::parse_timestamp;

#[derive(Clone)]
pub struct SqliteEscalationRepository {
    pool: SqlitePool,
}

impl SqliteEscalationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EscalationRow {
    id: String,
    swarm_id: String,
    task_id: Option<String>,
    agent_id: Option<String>,
    kind: String,
    severity: String,
    description: String,
    suggested_actions: String,
    can_continue_without: i64,
    status: String,
    resolution: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EscalationRow> for Escalation {
    type Error = OrchestratorError;

    fn try_from(row: EscalationRow) -> Result<Self, Self::Error> {
        Ok(Escalation {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrchestratorError::Internal(format!("bad escalation id: {e}")))?,
            swarm_id: Uuid::parse_str(&row.swarm_id)
                .map_err(|e| OrchestratorError::Internal(format!("bad swarm id: {e}")))?,
            task_id: row.task_id.map(TaskId::new),
            agent_id: row
                .agent_id
                .map(|s| {
                    Uuid::parse_str(&s)
                        .map_err(|e| OrchestratorError::Internal(format!("bad agent id: {e}")))
                })
                .transpose()?,
            kind: EscalationKind::from_str(&row.kind).ok_or_else(|| {
                OrchestratorError::Internal(format!("bad escalation kind: {}", row.kind))
            })?,
            severity: EscalationSeverity::from_str(&row.severity).ok_or_else(|| {
                OrchestratorError::Internal(format!("bad severity: {}", row.severity))
            })?,
            description: row.description,
            suggested_actions: serde_json::from_str(&row.suggested_actions)?,
            can_continue_without: row.can_continue_without != 0,
            status: EscalationStatus::from_str(&row.status).ok_or_else(|| {
                OrchestratorError::Internal(format!("bad escalation status: {}", row.status))
            })?,
            resolution: row
                .resolution
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl EscalationRepository for SqliteEscalationRepository {
    async fn create(&self, escalation: &Escalation) -> DomainResult<()> {
        let actions_json = serde_json::to_string(&escalation.suggested_actions)?;
        let resolution_json = escalation
            .resolution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO escalations (id, swarm_id, task_id, agent_id, kind, severity,
             description, suggested_actions, can_continue_without, status, resolution,
             created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(escalation.id.to_string())
        .bind(escalation.swarm_id.to_string())
        .bind(escalation.task_id.as_ref().map(|t| t.0.clone()))
        .bind(escalation.agent_id.map(|id| id.to_string()))
        .bind(escalation.kind.as_str())
        .bind(escalation.severity.as_str())
        .bind(&escalation.description)
        .bind(&actions_json)
        .bind(i64::from(escalation.can_continue_without))
        .bind(escalation.status.as_str())
        .bind(resolution_json)
        .bind(escalation.created_at.to_rfc3339())
        .bind(escalation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Escalation>> {
        let row: Option<EscalationRow> = sqlx::query_as("SELECT * FROM escalations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Escalation::try_from).transpose()
    }

    async fn list_by_swarm(
        &self,
        swarm_id: Uuid,
        status: Option<EscalationStatus>,
    ) -> DomainResult<Vec<Escalation>> {
        let rows: Vec<EscalationRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM escalations WHERE swarm_id = ? AND status = ?
                     ORDER BY created_at ASC",
                )
                .bind(swarm_id.to_string())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM escalations WHERE swarm_id = ? ORDER BY created_at ASC",
                )
                .bind(swarm_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Escalation::try_from).collect()
    }

    async fn update(&self, escalation: &Escalation) -> DomainResult<()> {
        let actions_json = serde_json::to_string(&escalation.suggested_actions)?;
        let resolution_json = escalation
            .resolution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "UPDATE escalations SET kind = ?, severity = ?, description = ?,
             suggested_actions = ?, can_continue_without = ?, status = ?, resolution = ?,
             updated_at = ? WHERE id = ?",
        )
        .bind(escalation.kind.as_str())
        .bind(escalation.severity.as_str())
        .bind(&escalation.description)
        .bind(&actions_json)
        .bind(i64::from(escalation.can_continue_without))
        .bind(escalation.status.as_str())
        .bind(resolution_json)
        .bind(escalation.updated_at.to_rfc3339())
        .bind(escalation.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::EscalationNotFound(escalation.id));
        }
        Ok(())
    }
}
