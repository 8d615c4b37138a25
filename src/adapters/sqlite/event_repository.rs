//! SQLite implementation of the append-only event log.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{EventKind, SwarmEvent};
use crate::domain::ports::EventRepository;

use super::swarm_repository::parse_timestamp;

#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    seq: i64,
    id: String,
    swarm_id: String,
    kind: String,
    timestamp: String,
    data: String,
}

impl TryFrom<EventRow> for SwarmEvent {
    type Error = OrchestratorError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(SwarmEvent {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| OrchestratorError::Internal(format!("bad event id: {e}")))?,
            seq: row.seq,
            swarm_id: Uuid::parse_str(&row.swarm_id)
                .map_err(|e| OrchestratorError::Internal(format!("bad swarm id: {e}")))?,
            kind: EventKind::from_str(&row.kind).ok_or_else(|| {
                OrchestratorError::Internal(format!("bad event kind: {}", row.kind))
            })?,
            timestamp: parse_timestamp(&row.timestamp)?,
            data: serde_json::from_str(&row.data)?,
        })
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn append(&self, event: &SwarmEvent) -> DomainResult<()> {
        let data_json = serde_json::to_string(&event.data)?;

        sqlx::query(
            "INSERT INTO events (id, swarm_id, kind, timestamp, data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.swarm_id.to_string())
        .bind(event.kind.as_str())
        .bind(event.timestamp.to_rfc3339())
        .bind(&data_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn by_kind(&self, swarm_id: Uuid, kind: EventKind) -> DomainResult<Vec<SwarmEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM events WHERE swarm_id = ? AND kind = ? ORDER BY seq ASC",
        )
        .bind(swarm_id.to_string())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SwarmEvent::try_from).collect()
    }

    async fn by_swarm(&self, swarm_id: Uuid) -> DomainResult<Vec<SwarmEvent>> {
        let rows: Vec<EventRow> =
            sqlx::query_as("SELECT * FROM events WHERE swarm_id = ? ORDER BY seq ASC")
                .bind(swarm_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(SwarmEvent::try_from).collect()
    }
}
