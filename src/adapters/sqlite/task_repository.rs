//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{Task, TaskId, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::swarm_repository::parse_timestamp;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_dependencies(&self, task: &mut Task) -> DomainResult<()> {
        let deps: Vec<(String,)> = sqlx::query_as(
            "SELECT depends_on FROM task_dependencies WHERE swarm_id = ? AND task_id = ?
             ORDER BY depends_on ASC",
        )
        .bind(task.swarm_id.to_string())
        .bind(&task.id.0)
        .fetch_all(&self.pool)
        .await?;

        task.dependencies = deps.into_iter().map(|(d,)| TaskId::new(d)).collect();
        Ok(())
    }

    async fn persist(&self, task: &Task, expected_version: u64) -> DomainResult<()> {
        let data_json = serde_json::to_string(&task.data)?;

        let result = sqlx::query(
            "UPDATE tasks SET agent_id = ?, title = ?, description = ?, priority = ?,
             status = ?, data = ?, attempts = ?, max_attempts = ?, last_error = ?,
             failed_at = ?, version = ?, updated_at = ?, started_at = ?, completed_at = ?
             WHERE swarm_id = ? AND id = ? AND version = ?",
        )
        .bind(task.agent_id.map(|id| id.to_string()))
        .bind(&task.title)
        .bind(&task.description)
        .bind(i64::from(task.priority))
        .bind(task.status.as_str())
        .bind(&data_json)
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(&task.last_error)
        .bind(task.failed_at.map(|t| t.to_rfc3339()))
        .bind(task.version as i64)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.swarm_id.to_string())
        .bind(&task.id.0)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(task.swarm_id, &task.id).await? {
                Some(_) => Err(OrchestratorError::ConcurrencyConflict {
                    entity: "task".to_string(),
                    id: task.id.to_string(),
                }),
                None => Err(OrchestratorError::TaskNotFound(task.id.to_string())),
            };
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    swarm_id: String,
    id: String,
    agent_id: Option<String>,
    title: String,
    description: String,
    priority: i64,
    status: String,
    data: String,
    attempts: i64,
    max_attempts: i64,
    last_error: Option<String>,
    failed_at: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = OrchestratorError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: TaskId::new(row.id),
            swarm_id: Uuid::parse_str(&row.swarm_id)
                .map_err(|e| OrchestratorError::Internal(format!("bad swarm id: {e}")))?,
            agent_id: row
                .agent_id
                .map(|s| {
                    Uuid::parse_str(&s)
                        .map_err(|e| OrchestratorError::Internal(format!("bad agent id: {e}")))
                })
                .transpose()?,
            title: row.title,
            description: row.description,
            priority: row.priority as u8,
            status: TaskStatus::from_str(&row.status).ok_or_else(|| {
                OrchestratorError::Internal(format!("bad task status: {}", row.status))
            })?,
            dependencies: Vec::new(), // filled by load_dependencies
            data: serde_json::from_str(&row.data)?,
            attempts: row.attempts as u32,
            max_attempts: row.max_attempts as u32,
            last_error: row.last_error,
            failed_at: row.failed_at.as_deref().map(parse_timestamp).transpose()?,
            version: row.version as u64,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            started_at: row.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: row.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Merge `incoming` object keys into `base`; non-object payloads replace.
fn merge_data(base: &mut serde_json::Value, incoming: serde_json::Value) {
    match (base, incoming) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                base_map.insert(k, v);
            }
        }
        (base_slot, incoming_value) => *base_slot = incoming_value,
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        task.validate().map_err(OrchestratorError::Validation)?;
        let data_json = serde_json::to_string(&task.data)?;

        sqlx::query(
            "INSERT INTO tasks (swarm_id, id, agent_id, title, description, priority, status,
             data, attempts, max_attempts, last_error, failed_at, version, created_at,
             updated_at, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.swarm_id.to_string())
        .bind(&task.id.0)
        .bind(task.agent_id.map(|id| id.to_string()))
        .bind(&task.title)
        .bind(&task.description)
        .bind(i64::from(task.priority))
        .bind(task.status.as_str())
        .bind(&data_json)
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(&task.last_error)
        .bind(task.failed_at.map(|t| t.to_rfc3339()))
        .bind(task.version as i64)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        for dep in &task.dependencies {
            sqlx::query(
                "INSERT OR IGNORE INTO task_dependencies (swarm_id, task_id, depends_on)
                 VALUES (?, ?, ?)",
            )
            .bind(task.swarm_id.to_string())
            .bind(&task.id.0)
            .bind(&dep.0)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn get(&self, swarm_id: Uuid, id: &TaskId) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE swarm_id = ? AND id = ?")
                .bind(swarm_id.to_string())
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(r) => {
                let mut task = r.try_into()?;
                self.load_dependencies(&mut task).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, swarm_id: Uuid, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE swarm_id = ?");
        let mut bindings: Vec<String> = vec![swarm_id.to_string()];

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(agent_id) = &filter.agent_id {
            query.push_str(" AND agent_id = ?");
            bindings.push(agent_id.to_string());
        }

        query.push_str(" ORDER BY created_at ASC, id ASC");

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        let mut tasks = Vec::new();
        for row in rows {
            let mut task: Task = row.try_into()?;
            self.load_dependencies(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        // Caller mutated through the state machine, which bumped version;
        // the stored row must still be one behind.
        self.persist(task, task.version - 1).await
    }

    async fn update_status(
        &self,
        swarm_id: Uuid,
        id: &TaskId,
        status: TaskStatus,
        data: Option<serde_json::Value>,
    ) -> DomainResult<()> {
        let mut task = self
            .get(swarm_id, id)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(id.to_string()))?;

        // Idempotent: re-applying the current status is a no-op.
        if task.status == status {
            return Ok(());
        }

        let previous_version = task.version;
        task.transition_to(status)
            .map_err(|_| OrchestratorError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: status.as_str().to_string(),
            })?;

        if let Some(incoming) = data {
            merge_data(&mut task.data, incoming);
        }

        self.persist(&task, previous_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_data_objects() {
        let mut base = json!({"a": 1});
        merge_data(&mut base, json!({"b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_merge_data_overwrites_keys() {
        let mut base = json!({"a": 1});
        merge_data(&mut base, json!({"a": 3}));
        assert_eq!(base, json!({"a": 3}));
    }

    #[test]
    fn test_merge_data_non_object_replaces() {
        let mut base = json!({"a": 1});
        merge_data(&mut base, json!("artifact"));
        assert_eq!(base, json!("artifact"));
    }
}
