//! HTTP handlers for the orchestrator surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::{EscalationStatus, Task};
use crate::domain::ports::TaskFilter;
use crate::services::{ProcessOutcome, TaskScheduler};

use super::server::AppState;

/// Structured failure payload returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub remediation: String,
    pub affected_task_ids: Vec<String>,
}

/// Error wrapper mapping domain errors onto status codes.
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, remediation) = match &self.0 {
            OrchestratorError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Fix the request payload and retry",
            ),
            OrchestratorError::SwarmNotFound(_)
            | OrchestratorError::TaskNotFound(_)
            | OrchestratorError::EscalationNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", "Check the identifier")
            }
            OrchestratorError::EscalationAlreadyResolved(_) => (
                StatusCode::CONFLICT,
                "already_resolved",
                "The escalation no longer accepts input",
            ),
            OrchestratorError::LlmUnavailable(_)
            | OrchestratorError::StorageUnavailable(_)
            | OrchestratorError::RateLimited { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
                "Retry after a short delay",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Inspect the orchestrator logs",
            ),
        };

        let body = ErrorBody {
            kind: kind.to_string(),
            message: self.0.to_string(),
            remediation: remediation.to_string(),
            affected_task_ids: Vec::new(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /orchestrator/process
pub async fn process_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(OrchestratorError::Validation("message cannot be empty".into()).into());
    }

    let outcome = state.orchestrator.process_message(&request.message).await?;
    let body = match outcome {
        ProcessOutcome::NeedsClarification { questions } => json!({
            "status": "needs_clarification",
            "clarification_questions": questions,
        }),
        ProcessOutcome::Started { swarm_id, num_agents, complexity } => json!({
            "status": "started",
            "swarm_id": swarm_id,
            "planner_url": format!("/api/planner/{swarm_id}"),
            "num_agents": num_agents,
            "complexity": complexity,
        }),
    };
    Ok(Json(body))
}

#[derive(Debug, Serialize)]
struct TaskNode {
    id: String,
    title: String,
    status: &'static str,
    priority: u8,
    subtasks: Vec<TaskNode>,
}

fn task_node(task: &Task, subtasks: Vec<TaskNode>) -> TaskNode {
    TaskNode {
        id: task.id.to_string(),
        title: task.title.clone(),
        status: task.status.as_str(),
        priority: task.priority,
        subtasks,
    }
}

/// GET /api/planner/{swarm_id}
pub async fn get_task_tree(
    State(state): State<AppState>,
    Path(swarm_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .swarm_repo
        .get(swarm_id)
        .await?
        .ok_or(OrchestratorError::SwarmNotFound(swarm_id))?;

    let tasks = state.task_repo.list(swarm_id, TaskFilter::default()).await?;

    // Group "N.x" subtasks under their "N" parent when one exists;
    // everything else is a root node.
    let mut roots: Vec<TaskNode> = Vec::new();
    for task in &tasks {
        if task.id.0.contains('.') {
            continue;
        }
        let prefix = format!("{}.", task.id.0);
        let subtasks = tasks
            .iter()
            .filter(|t| t.id.0.starts_with(&prefix))
            .map(|t| task_node(t, Vec::new()))
            .collect();
        roots.push(task_node(task, subtasks));
    }
    let parent_prefixes: Vec<String> = tasks
        .iter()
        .filter(|t| !t.id.0.contains('.'))
        .map(|t| format!("{}.", t.id.0))
        .collect();
    for task in &tasks {
        let has_parent = parent_prefixes.iter().any(|p| task.id.0.starts_with(p));
        if task.id.0.contains('.') && !has_parent {
            roots.push(task_node(task, Vec::new()));
        }
    }

    Ok(Json(json!({"swarm_id": swarm_id, "tasks": roots})))
}

/// GET /api/planner/{swarm_id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(swarm_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .swarm_repo
        .get(swarm_id)
        .await?
        .ok_or(OrchestratorError::SwarmNotFound(swarm_id))?;

    let tasks = state.task_repo.list(swarm_id, TaskFilter::default()).await?;
    let report = TaskScheduler::progress_of(&tasks);
    let ready = state.scheduler.ready_tasks(swarm_id).await?;
    let has_cycle = TaskScheduler::detect_cycle(&tasks).is_some();

    Ok(Json(json!({
        "progress": report.progress,
        "completed": report.completed,
        "in_progress": report.in_progress,
        "pending": report.pending,
        "failed": report.failed,
        "total": report.total,
        "ready_tasks": ready.iter().map(|t| t.id.to_string()).collect::<Vec<_>>(),
        "has_cycle": has_cycle,
        "conflict_stats": {
            "active_locks": state.conflicts.active_locks(),
        },
    })))
}

/// GET /api/planner/{swarm_id}/escalations
pub async fn get_escalations(
    State(state): State<AppState>,
    Path(swarm_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .swarm_repo
        .get(swarm_id)
        .await?
        .ok_or(OrchestratorError::SwarmNotFound(swarm_id))?;

    let escalations = state
        .escalation_repo
        .list_by_swarm(swarm_id, Some(EscalationStatus::Pending))
        .await?;

    Ok(Json(json!({"escalations": escalations})))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub action: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// POST /api/planner/{swarm_id}/escalations/{id}/resolve
pub async fn resolve_escalation(
    State(state): State<AppState>,
    Path((swarm_id, escalation_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut payload = json!({"action": request.action});
    if let Some(value) = request.value {
        payload["value"] = value;
    }

    let status = state
        .orchestrator
        .resolve_escalation(swarm_id, escalation_id, payload)
        .await?;

    Ok(Json(json!({"status": status.as_str()})))
}

/// GET /swarms
pub async fn list_swarms(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let swarms = state.swarm_repo.list().await?;
    let rows: Vec<serde_json::Value> = swarms
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "status": s.status.as_str(),
                "num_agents": s.num_agents,
                "created_at": s.created_at,
            })
        })
        .collect();
    Ok(Json(json!({"swarms": rows})))
}

/// GET /healthz
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}
