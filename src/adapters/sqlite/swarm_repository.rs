//! SQLite implementation of the SwarmRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{Swarm, SwarmStatus};
use crate::domain::ports::SwarmRepository;

#[derive(Clone)]
pub struct SqliteSwarmRepository {
    pool: SqlitePool,
}

impl SqliteSwarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SwarmRow {
    id: String,
    name: String,
    status: String,
    num_agents: i64,
    metadata: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SwarmRow> for Swarm {
    type Error = OrchestratorError;

    fn try_from(row: SwarmRow) -> Result<Self, Self::Error> {
        Ok(Swarm {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrchestratorError::Internal(format!("bad swarm id: {e}")))?,
            name: row.name,
            status: SwarmStatus::from_str(&row.status)
                .ok_or_else(|| OrchestratorError::Internal(format!("bad status: {}", row.status)))?,
            num_agents: row.num_agents as u32,
            metadata: serde_json::from_str(&row.metadata)?,
            version: row.version as u64,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(format!("bad timestamp '{s}': {e}")))
}

#[async_trait]
impl SwarmRepository for SqliteSwarmRepository {
    async fn create(&self, swarm: &Swarm) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&swarm.metadata)?;

        sqlx::query(
            "INSERT INTO swarms (id, name, status, num_agents, metadata, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(swarm.id.to_string())
        .bind(&swarm.name)
        .bind(swarm.status.as_str())
        .bind(i64::from(swarm.num_agents))
        .bind(&metadata_json)
        .bind(swarm.version as i64)
        .bind(swarm.created_at.to_rfc3339())
        .bind(swarm.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Swarm>> {
        let row: Option<SwarmRow> = sqlx::query_as("SELECT * FROM swarms WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Swarm::try_from).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Swarm>> {
        let rows: Vec<SwarmRow> = sqlx::query_as("SELECT * FROM swarms ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Swarm::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SwarmStatus,
        expected_version: u64,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE swarms SET status = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a lost race from a missing row.
            return match self.get(id).await? {
                Some(_) => Err(OrchestratorError::ConcurrencyConflict {
                    entity: "swarm".to_string(),
                    id: id.to_string(),
                }),
                None => Err(OrchestratorError::SwarmNotFound(id)),
            };
        }

        Ok(())
    }

    async fn update_metadata(&self, id: Uuid, metadata: serde_json::Value) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&metadata)?;
        let result = sqlx::query(
            "UPDATE swarms SET metadata = ?, version = version + 1, updated_at = ? WHERE id = ?",
        )
        .bind(&metadata_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::SwarmNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM swarms WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::SwarmNotFound(id));
        }
        Ok(())
    }
}
