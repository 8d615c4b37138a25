//! HTTP server assembly.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;

use crate::domain::ports::{
    EscalationRepository, SwarmRepository, TaskRepository,
};
use crate::services::{ConflictResolver, Orchestrator, TaskScheduler};

use super::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub swarm_repo: Arc<dyn SwarmRepository>,
    pub task_repo: Arc<dyn TaskRepository>,
    pub escalation_repo: Arc<dyn EscalationRepository>,
    pub scheduler: Arc<TaskScheduler>,
    pub conflicts: Arc<ConflictResolver>,
}

/// Build the router over the orchestrator surface.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/orchestrator/process", post(handlers::process_message))
        .route("/api/planner/:swarm_id", get(handlers::get_task_tree))
        .route("/api/planner/:swarm_id/progress", get(handlers::get_progress))
        .route(
            "/api/planner/:swarm_id/escalations",
            get(handlers::get_escalations),
        )
        .route(
            "/api/planner/:swarm_id/escalations/:escalation_id/resolve",
            post(handlers::resolve_escalation),
        )
        .route("/swarms", get(handlers::list_swarms))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind HTTP listener")?;

    tracing::info!(%addr, "Orchestrator HTTP surface listening");
    axum::serve(listener, app).await.context("HTTP server exited")?;
    Ok(())
}
