//! Top-level orchestration service.
//!
//! Owns the request-to-swarm pipeline (extract, create, launch) and the
//! per-swarm cancellation handles. The HTTP surface is a thin layer over
//! this service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{EscalationStatus, Swarm, SwarmStatus};
use crate::domain::ports::{EscalationRepository, SwarmRepository};

use super::planner::AdaptivePlanner;
use super::scope_extractor::{ExtractionOutcome, ScopeExtractor};
use super::workflow::{WorkflowEngine, WorkflowOutcome};

/// Result of submitting a user message.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The request was too vague; ask these first
    NeedsClarification { questions: Vec<String> },
    /// A swarm was created and its workflow launched
    Started { swarm_id: Uuid, num_agents: u32, complexity: String },
}

/// One spawned workflow execution and the means to stop it.
struct LiveRun {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Ties extraction, planning, and workflow execution together.
pub struct Orchestrator {
    extractor: Arc<ScopeExtractor>,
    swarm_repo: Arc<dyn SwarmRepository>,
    escalations: Arc<dyn EscalationRepository>,
    engine: Arc<WorkflowEngine>,
    /// Live workflow runs keyed by swarm
    runs: Mutex<HashMap<Uuid, LiveRun>>,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<ScopeExtractor>,
        swarm_repo: Arc<dyn SwarmRepository>,
        escalations: Arc<dyn EscalationRepository>,
        engine: Arc<WorkflowEngine>,
    ) -> Self {
        Self {
            extractor,
            swarm_repo,
            escalations,
            engine,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Process a user message end to end: extract a scope, create the
    /// swarm, and launch its workflow in the background.
    pub async fn process_message(&self, message: &str) -> DomainResult<ProcessOutcome> {
        let scope = match self.extractor.extract(message).await? {
            ExtractionOutcome::NeedsClarification(questions) => {
                return Ok(ProcessOutcome::NeedsClarification { questions });
            }
            ExtractionOutcome::Scope(scope) => *scope,
        };

        let plan = AdaptivePlanner::build_plan(&scope);
        let name = if scope.project_name.is_empty() {
            "unnamed-project".to_string()
        } else {
            scope.project_name.clone()
        };

        let swarm = Swarm::new(name, plan.num_agents())
            .with_metadata(json!({ "scope": scope }));
        self.swarm_repo.create(&swarm).await?;

        tracing::info!(
            swarm_id = %swarm.id,
            complexity = plan.complexity.as_str(),
            num_agents = plan.num_agents(),
            "Swarm created"
        );

        self.launch(swarm.id).await;

        Ok(ProcessOutcome::Started {
            swarm_id: swarm.id,
            num_agents: plan.num_agents(),
            complexity: plan.complexity.as_str().to_string(),
        })
    }

    /// Launch (or relaunch) the workflow for a swarm in the background.
    ///
    /// Relaunching after an escalation resolution is how paused work
    /// resumes; completed steps replay from checkpoints.
    pub async fn launch(&self, swarm_id: Uuid) {
        // Hold the map across spawn + insert so a concurrent cancel always
        // finds the run it is cancelling.
        let mut runs = self.runs.lock().await;
        let (tx, rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(async move {
            match engine.run(swarm_id, rx).await {
                Ok(WorkflowOutcome::Completed(_)) => {
                    tracing::info!(%swarm_id, "Workflow completed");
                }
                Ok(WorkflowOutcome::Paused { open_escalations }) => {
                    tracing::warn!(%swarm_id, open_escalations, "Workflow paused");
                }
                Ok(WorkflowOutcome::Cancelled) => {
                    tracing::info!(%swarm_id, "Workflow cancelled");
                }
                Err(e) => {
                    tracing::error!(%swarm_id, error = %e, "Workflow failed");
                }
            }
        });

        runs.insert(swarm_id, LiveRun { cancel: tx, handle });
    }

    /// Cancel a swarm. Idempotent: cancelling a terminal or unknown-run
    /// swarm simply drains whatever remains.
    pub async fn cancel(&self, swarm_id: Uuid) -> DomainResult<()> {
        let run = self.runs.lock().await.remove(&swarm_id);
        match run {
            Some(run) => {
                // The running workflow observes this at its next checkpoint
                // and drains itself.
                let _ = run.cancel.send(true);
            }
            None => {
                // No live run (e.g. after restart): drain directly.
                self.engine.handle_cancel(swarm_id).await?;
            }
        }
        Ok(())
    }

    /// Signal cancellation to every live run and wait for each to drain.
    ///
    /// Called on process shutdown so outstanding dispatches cancel cleanly
    /// (locks released, remaining tasks skipped) instead of being dropped
    /// mid-await when the runtime exits.
    pub async fn shutdown(&self) {
        let runs: Vec<(Uuid, LiveRun)> = self.runs.lock().await.drain().collect();
        for (swarm_id, run) in runs {
            let _ = run.cancel.send(true);
            match tokio::time::timeout(Duration::from_secs(10), run.handle).await {
                Ok(_) => tracing::info!(%swarm_id, "Workflow drained for shutdown"),
                Err(_) => {
                    tracing::warn!(%swarm_id, "Workflow did not drain before the shutdown deadline");
                }
            }
        }
    }

    /// Apply a resolution payload to an escalation. A full resolution
    /// relaunches the paused workflow.
    pub async fn resolve_escalation(
        &self,
        swarm_id: Uuid,
        escalation_id: Uuid,
        payload: serde_json::Value,
    ) -> DomainResult<EscalationStatus> {
        let mut escalation = self
            .escalations
            .get(escalation_id)
            .await?
            .filter(|e| e.swarm_id == swarm_id)
            .ok_or(OrchestratorError::EscalationNotFound(escalation_id))?;

        if escalation.status != EscalationStatus::Pending {
            return Err(OrchestratorError::EscalationAlreadyResolved(escalation_id));
        }

        escalation
            .apply_resolution(payload)
            .map_err(OrchestratorError::Validation)?;
        self.escalations.update(&escalation).await?;

        if escalation.status == EscalationStatus::Resolved {
            let swarm = self.swarm_repo.get(swarm_id).await?;
            if swarm.is_some_and(|s| {
                matches!(s.status, SwarmStatus::Running | SwarmStatus::AwaitingApproval)
            }) {
                tracing::info!(%swarm_id, %escalation_id, "Escalation resolved, relaunching");
                self.launch(swarm_id).await;
            }
        }

        Ok(escalation.status)
    }
}
