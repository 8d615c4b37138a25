//! SQLite implementation of the workflow checkpoint store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::CheckpointRepository;

#[derive(Clone)]
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn save(
        &self,
        swarm_id: Uuid,
        step: &str,
        result: &serde_json::Value,
    ) -> DomainResult<()> {
        let result_json = serde_json::to_string(result)?;

        // Replaying a completed step overwrites its checkpoint; the
        // per-(swarm, step) key keeps this idempotent.
        sqlx::query(
            "INSERT INTO workflow_checkpoints (swarm_id, step, result, completed_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(swarm_id, step) DO UPDATE SET
                result = excluded.result,
                completed_at = excluded.completed_at",
        )
        .bind(swarm_id.to_string())
        .bind(step)
        .bind(&result_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, swarm_id: Uuid, step: &str) -> DomainResult<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT result FROM workflow_checkpoints WHERE swarm_id = ? AND step = ?",
        )
        .bind(swarm_id.to_string())
        .bind(step)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(json,)| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    async fn list_steps(&self, swarm_id: Uuid) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT step FROM workflow_checkpoints WHERE swarm_id = ? ORDER BY completed_at ASC",
        )
        .bind(swarm_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}
