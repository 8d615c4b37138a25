//! Durable workflow execution.
//!
//! Drives a swarm through an ordered sequence of checkpointed activities.
//! Each activity's result is persisted before the step is declared
//! complete, so a restart replays from the first missing checkpoint rather
//! than re-executing finished work. Step ordering is strict; only the
//! dispatch step runs work in parallel, and completion order inside it is
//! unobserved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    Agent, Escalation, EscalationSeverity, EventKind, Scope, Swarm, SwarmEvent, SwarmStatus,
    Task, TaskStatus,
};
use crate::domain::ports::metrics::names;
use crate::domain::ports::{
    AgentRepository, CheckpointRepository, CompletionRequest, EscalationRepository,
    EventRepository, MetricsSink, SwarmRepository, TaskFilter, TaskRepository, ToolCall,
    ToolContext, ToolInvoker,
};
use crate::infrastructure::llm::LlmGateway;

use super::agent_runner::AgentRunner;
use super::conflict_resolver::ConflictResolver;
use super::cost_tracker::CostTracker;
use super::planner::AdaptivePlanner;
use super::retry_manager::{RetryDecision, RetryManager};
use super::scheduler::TaskScheduler;
use super::slo_gate::{SloGate, SloInputs};

/// The ordered activities of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    GeneratePlan,
    DispatchTasks,
    UiInference,
    VisualTest,
    ConflictResolution,
    TestGate,
    SloEnforce,
    Finalize,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneratePlan => "generate_plan",
            Self::DispatchTasks => "dispatch_tasks",
            Self::UiInference => "ui_inference",
            Self::VisualTest => "visual_test",
            Self::ConflictResolution => "conflict_resolution",
            Self::TestGate => "test_gate",
            Self::SloEnforce => "slo_enforce",
            Self::Finalize => "finalize",
        }
    }

    pub fn all() -> &'static [WorkflowStep] {
        &[
            Self::GeneratePlan,
            Self::DispatchTasks,
            Self::UiInference,
            Self::VisualTest,
            Self::ConflictResolution,
            Self::TestGate,
            Self::SloEnforce,
            Self::Finalize,
        ]
    }

    /// How many times a failed activity is re-attempted.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::DispatchTasks
            | Self::UiInference
            | Self::VisualTest
            | Self::ConflictResolution
            | Self::TestGate => 2,
            Self::SloEnforce => 1,
            Self::GeneratePlan | Self::Finalize => 0,
        }
    }
}

/// Wall-clock budgets per activity.
#[derive(Debug, Clone)]
pub struct WorkflowTimeouts {
    pub plan: Duration,
    pub dispatch_task: Duration,
    pub ui_inference: Duration,
    pub visual_test: Duration,
    pub conflict_resolution: Duration,
    pub test_gate: Duration,
    pub slo_enforce: Duration,
    pub finalize: Duration,
}

impl Default for WorkflowTimeouts {
    fn default() -> Self {
        Self {
            plan: Duration::from_secs(60),
            dispatch_task: Duration::from_secs(1800),
            ui_inference: Duration::from_secs(45),
            visual_test: Duration::from_secs(90),
            conflict_resolution: Duration::from_secs(60),
            test_gate: Duration::from_secs(30),
            slo_enforce: Duration::from_secs(30),
            finalize: Duration::from_secs(30),
        }
    }
}

impl WorkflowTimeouts {
    fn for_step(&self, step: WorkflowStep) -> Option<Duration> {
        match step {
            WorkflowStep::GeneratePlan => Some(self.plan),
            // The dispatch step is bounded per task, not as a whole.
            WorkflowStep::DispatchTasks => None,
            WorkflowStep::UiInference => Some(self.ui_inference),
            WorkflowStep::VisualTest => Some(self.visual_test),
            WorkflowStep::ConflictResolution => Some(self.conflict_resolution),
            WorkflowStep::TestGate => Some(self.test_gate),
            WorkflowStep::SloEnforce => Some(self.slo_enforce),
            WorkflowStep::Finalize => Some(self.finalize),
        }
    }
}

/// Engine-level knobs.
#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    pub timeouts: WorkflowTimeouts,
    /// Coverage the TestGate step requires
    pub coverage_gate_pct: f64,
    /// Maximum acceptable screenshot diff fraction
    pub visual_diff_max: f64,
    /// USD per 1k tokens for the cost SLO
    pub rate_per_k_tokens: f64,
    /// Pause between activity retry attempts
    pub step_retry_pause: Duration,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            timeouts: WorkflowTimeouts::default(),
            coverage_gate_pct: 80.0,
            visual_diff_max: 0.05,
            rate_per_k_tokens: 0.01,
            step_retry_pause: Duration::from_millis(500),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// All steps finished; swarm is completed
    Completed(serde_json::Value),
    /// Escalations are outstanding; the swarm stays running and the monitor
    /// resumes blocked work once they resolve
    Paused { open_escalations: usize },
    /// The swarm was cancelled mid-run
    Cancelled,
}

/// UI plan produced by the inference step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiPlan {
    pub components: Vec<serde_json::Value>,
    pub constraints: UiConstraints,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub needs_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConstraints {
    #[serde(default)]
    pub responsive: bool,
    #[serde(default = "default_wcag")]
    pub wcag: String,
    #[serde(default)]
    pub theme: String,
}

fn default_wcag() -> String {
    "2.1".to_string()
}

enum StepFlow {
    Done(serde_json::Value),
    Paused(usize),
    Cancelled,
}

/// Mutable state threaded through the steps, rehydrated from checkpoints
/// on resume.
#[derive(Default)]
struct StepContext {
    ui_plan: Option<serde_json::Value>,
    coverage_pct: Option<f64>,
}

/// The durable step machine.
pub struct WorkflowEngine {
    swarm_repo: Arc<dyn SwarmRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    task_repo: Arc<dyn TaskRepository>,
    events: Arc<dyn EventRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    escalations: Arc<dyn EscalationRepository>,
    scheduler: Arc<TaskScheduler>,
    planner: Arc<AdaptivePlanner>,
    runner: Arc<AgentRunner>,
    conflicts: Arc<ConflictResolver>,
    retry: Arc<RetryManager>,
    slo_gate: Arc<SloGate>,
    cost: Arc<CostTracker>,
    gateway: Arc<LlmGateway>,
    tools: Arc<dyn ToolInvoker>,
    metrics: Arc<dyn MetricsSink>,
    config: WorkflowEngineConfig,
}

#[allow(clippy::too_many_arguments)]
impl WorkflowEngine {
    pub fn new(
        swarm_repo: Arc<dyn SwarmRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        task_repo: Arc<dyn TaskRepository>,
        events: Arc<dyn EventRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        escalations: Arc<dyn EscalationRepository>,
        scheduler: Arc<TaskScheduler>,
        planner: Arc<AdaptivePlanner>,
        runner: Arc<AgentRunner>,
        conflicts: Arc<ConflictResolver>,
        retry: Arc<RetryManager>,
        slo_gate: Arc<SloGate>,
        cost: Arc<CostTracker>,
        gateway: Arc<LlmGateway>,
        tools: Arc<dyn ToolInvoker>,
        metrics: Arc<dyn MetricsSink>,
        config: WorkflowEngineConfig,
    ) -> Self {
        Self {
            swarm_repo,
            agent_repo,
            task_repo,
            events,
            checkpoints,
            escalations,
            scheduler,
            planner,
            runner,
            conflicts,
            retry,
            slo_gate,
            cost,
            gateway,
            tools,
            metrics,
            config,
        }
    }

    /// Drive one swarm to a terminal outcome.
    ///
    /// Resumable: completed steps are skipped via their checkpoints.
    /// Cancellation is observed between steps and between dispatch waves.
    pub async fn run(
        &self,
        swarm_id: Uuid,
        cancel: watch::Receiver<bool>,
    ) -> DomainResult<WorkflowOutcome> {
        let swarm = self
            .swarm_repo
            .get(swarm_id)
            .await?
            .ok_or(OrchestratorError::SwarmNotFound(swarm_id))?;

        if swarm.status.is_terminal() {
            return Ok(WorkflowOutcome::Completed(json!({"already_terminal": true})));
        }

        let scope: Scope = swarm
            .metadata
            .get("scope")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        self.set_status(swarm_id, SwarmStatus::Running).await?;

        // Rehydrate context from prior checkpoints (resume path).
        let mut ctx = StepContext::default();
        if let Some(ui) = self.checkpoints.get(swarm_id, WorkflowStep::UiInference.as_str()).await? {
            ctx.ui_plan = Some(ui);
        }
        if let Some(gate) = self.checkpoints.get(swarm_id, WorkflowStep::TestGate.as_str()).await? {
            ctx.coverage_pct = gate.get("coverage_pct").and_then(serde_json::Value::as_f64);
        }

        for step in WorkflowStep::all() {
            if *cancel.borrow() {
                return self.handle_cancel(swarm_id).await;
            }
            if self.checkpoints.get(swarm_id, step.as_str()).await?.is_some() {
                tracing::debug!(%swarm_id, step = step.as_str(), "Checkpoint hit, skipping");
                continue;
            }

            let span = tracing::info_span!("workflow.step", %swarm_id, step = step.as_str());

            let mut attempt = 0;
            loop {
                let work = self
                    .execute_step(*step, &swarm, &scope, &mut ctx, &cancel)
                    .instrument(span.clone());
                let outcome = match self.config.timeouts.for_step(*step) {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(result) => result,
                        Err(_) => {
                            Err(OrchestratorError::TaskTimeout(step.as_str().to_string()))
                        }
                    },
                    None => work.await,
                };

                match outcome {
                    Ok(StepFlow::Done(value)) => {
                        self.checkpoints.save(swarm_id, step.as_str(), &value).await?;
                        if *step == WorkflowStep::TestGate {
                            ctx.coverage_pct =
                                value.get("coverage_pct").and_then(serde_json::Value::as_f64);
                        }
                        if *step == WorkflowStep::Finalize {
                            return Ok(WorkflowOutcome::Completed(value));
                        }
                        break;
                    }
                    Ok(StepFlow::Paused(open)) => {
                        tracing::info!(%swarm_id, open, "Workflow paused on escalations");
                        return Ok(WorkflowOutcome::Paused { open_escalations: open });
                    }
                    Ok(StepFlow::Cancelled) => return self.handle_cancel(swarm_id).await,
                    Err(err) => {
                        let hard_breach = matches!(err, OrchestratorError::SloBreach { .. });
                        if !hard_breach && attempt < step.max_retries() {
                            attempt += 1;
                            tracing::warn!(
                                step = step.as_str(),
                                attempt,
                                error = %err,
                                "Activity failed, retrying"
                            );
                            tokio::time::sleep(self.config.step_retry_pause).await;
                            continue;
                        }
                        return self.fail_workflow(swarm_id, *step, err).await;
                    }
                }
            }
        }

        // Finalize returns from inside the loop; reaching here means the
        // step list was exhausted with finalize already checkpointed.
        Ok(WorkflowOutcome::Completed(json!({"resumed": true})))
    }

    async fn execute_step(
        &self,
        step: WorkflowStep,
        swarm: &Swarm,
        scope: &Scope,
        ctx: &mut StepContext,
        cancel: &watch::Receiver<bool>,
    ) -> DomainResult<StepFlow> {
        match step {
            WorkflowStep::GeneratePlan => self.step_generate_plan(swarm, scope).await,
            WorkflowStep::DispatchTasks => self.step_dispatch(swarm, scope, cancel).await,
            WorkflowStep::UiInference => self.step_ui_inference(swarm, scope, ctx).await,
            WorkflowStep::VisualTest => self.step_visual_test(swarm, ctx).await,
            WorkflowStep::ConflictResolution => self.step_conflict_resolution(swarm, ctx).await,
            WorkflowStep::TestGate => self.step_test_gate(swarm).await,
            WorkflowStep::SloEnforce => self.step_slo_enforce(swarm, scope, ctx).await,
            WorkflowStep::Finalize => self.step_finalize(swarm).await,
        }
    }

    // ========================================================================
    // Step implementations
    // ========================================================================

    async fn step_generate_plan(&self, swarm: &Swarm, scope: &Scope) -> DomainResult<StepFlow> {
        // A crash after persist but before checkpoint leaves rows behind;
        // reuse them instead of double-creating.
        let existing = self.task_repo.list(swarm.id, TaskFilter::default()).await?;
        let plan = AdaptivePlanner::build_plan(scope);

        if existing.is_empty() {
            self.planner.persist(swarm.id, &plan).await?;
        }

        let mut metadata = swarm.metadata.clone();
        if let serde_json::Value::Object(map) = &mut metadata {
            map.insert("complexity".to_string(), json!(plan.complexity.as_str()));
            map.insert("plan_score".to_string(), json!(plan.score));
        }
        self.swarm_repo.update_metadata(swarm.id, metadata).await?;

        Ok(StepFlow::Done(json!({
            "complexity": plan.complexity.as_str(),
            "score": plan.score,
            "num_agents": plan.num_agents(),
            "total_tasks": plan.total_tasks(),
        })))
    }

    async fn step_dispatch(
        &self,
        swarm: &Swarm,
        scope: &Scope,
        cancel: &watch::Receiver<bool>,
    ) -> DomainResult<StepFlow> {
        let agents: HashMap<Uuid, Agent> = self
            .agent_repo
            .list_by_swarm(swarm.id)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let scope_summary = scope.summary();

        loop {
            if *cancel.borrow() {
                return Ok(StepFlow::Cancelled);
            }

            let ready = self.scheduler.ready_tasks(swarm.id).await?;
            if ready.is_empty() {
                return self.dispatch_wind_down(swarm.id).await;
            }

            // One task per agent per wave, capped at the swarm's allocation.
            let mut wave: Vec<Task> = Vec::new();
            let mut claimed: Vec<Uuid> = Vec::new();
            for task in ready {
                let Some(agent_id) = task.agent_id else { continue };
                if claimed.contains(&agent_id) {
                    continue;
                }
                claimed.push(agent_id);
                wave.push(task);
                if wave.len() >= swarm.num_agents as usize {
                    break;
                }
            }
            if wave.is_empty() {
                return self.dispatch_wind_down(swarm.id).await;
            }

            let mut join_set = JoinSet::new();
            for task in wave {
                let Some(agent_id) = task.agent_id else { continue };
                let Some(agent) = agents.get(&agent_id).cloned() else {
                    continue;
                };

                self.task_repo
                    .update_status(swarm.id, &task.id, TaskStatus::InProgress, None)
                    .await?;
                let mut working = agent.clone();
                working.start_task(task.id.clone());
                self.agent_repo.update_state(agent.id, &working.state).await?;

                let runner = Arc::clone(&self.runner);
                let summary = scope_summary.clone();
                let swarm_id = swarm.id;
                let task_timeout = self.config.timeouts.dispatch_task;
                join_set.spawn(async move {
                    let result = match tokio::time::timeout(
                        task_timeout,
                        runner.execute(swarm_id, &agent, &task, &summary),
                    )
                    .await
                    {
                        Ok(r) => r,
                        Err(_) => Err(OrchestratorError::TaskTimeout(task.id.to_string())),
                    };
                    (task, agent, result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (task, agent, result) = joined
                    .map_err(|e| OrchestratorError::Internal(format!("join error: {e}")))?;
                match result {
                    Ok(output) => {
                        self.task_repo
                            .update_status(
                                swarm.id,
                                &task.id,
                                TaskStatus::Completed,
                                Some(json!({
                                    "artifact": output.artifact,
                                    "coverage_pct": output.coverage_pct,
                                    "notes": output.notes,
                                })),
                            )
                            .await?;
                        let mut idle = agent.clone();
                        idle.finish_task();
                        self.agent_repo.update_state(agent.id, &idle.state).await?;
                    }
                    Err(err) => {
                        self.handle_task_failure(swarm.id, task, agent, err).await?;
                    }
                }
            }
        }
    }

    /// A failed task goes to the retry manager; retries reset it to pending
    /// after backoff, exhaustion escalates or blocks dependents.
    async fn handle_task_failure(
        &self,
        swarm_id: Uuid,
        task: Task,
        agent: Agent,
        err: OrchestratorError,
    ) -> DomainResult<()> {
        let mut failed = self
            .task_repo
            .get(swarm_id, &task.id)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task.id.to_string()))?;
        failed.fail(err.to_string()).map_err(OrchestratorError::Internal)?;
        self.task_repo.update(&failed).await?;

        self.conflicts.on_task_failed(swarm_id, &failed.id, agent.id).await?;
        let mut idle = agent.clone();
        idle.finish_task();
        self.agent_repo.update_state(agent.id, &idle.state).await?;

        match self.retry.decide(&failed, &err) {
            RetryDecision::Retry { kind, after, attempt } => {
                self.events
                    .append(&SwarmEvent::new(
                        swarm_id,
                        EventKind::Retry,
                        json!({
                            "task_id": failed.id,
                            "kind": kind.as_str(),
                            "attempt": attempt,
                            "backoff_ms": after.as_millis() as u64,
                            "error": err.to_string(),
                        }),
                    ))
                    .await?;
                tokio::time::sleep(after).await;
                failed.retry().map_err(OrchestratorError::Internal)?;
                self.task_repo.update(&failed).await?;
                self.conflicts.clear_failed(swarm_id, &failed.id);
            }
            RetryDecision::Escalate { escalation, suggested_actions, .. } => {
                let row = Escalation::new(swarm_id, escalation, err.to_string())
                    .with_task(failed.id.clone())
                    .with_agent(agent.id)
                    .with_severity(EscalationSeverity::High)
                    .with_suggested_actions(suggested_actions);
                self.escalations.create(&row).await?;
                self.events
                    .append(&SwarmEvent::new(
                        swarm_id,
                        EventKind::Escalation,
                        json!({"escalation_id": row.id, "task_id": failed.id,
                               "kind": row.kind.as_str()}),
                    ))
                    .await?;
                self.block_dependents(swarm_id, &failed).await?;
            }
            RetryDecision::GiveUp { kind } => {
                tracing::error!(task_id = %failed.id, kind = kind.as_str(),
                    "Task failed permanently");
                self.block_dependents(swarm_id, &failed).await?;
            }
        }
        Ok(())
    }

    /// Mark pending tasks whose dependency failed permanently as blocked.
    async fn block_dependents(&self, swarm_id: Uuid, failed: &Task) -> DomainResult<()> {
        let tasks = self.task_repo.list(swarm_id, TaskFilter::default()).await?;
        for task in tasks {
            if task.status == TaskStatus::Pending && task.dependencies.contains(&failed.id) {
                self.task_repo
                    .update_status(swarm_id, &task.id, TaskStatus::Blocked, None)
                    .await?;
            }
        }
        Ok(())
    }

    /// Decide how the dispatch step ends once no tasks are ready.
    async fn dispatch_wind_down(&self, swarm_id: Uuid) -> DomainResult<StepFlow> {
        let tasks = self.task_repo.list(swarm_id, TaskFilter::default()).await?;
        let report = TaskScheduler::progress_of(&tasks);

        if report.pending == 0 && report.failed == 0 && report.blocked == 0 {
            return Ok(StepFlow::Done(json!({
                "completed": report.completed,
                "skipped": report.skipped,
                "total": report.total,
            })));
        }

        let open = self
            .escalations
            .list_by_swarm(swarm_id, Some(crate::domain::models::EscalationStatus::Pending))
            .await?;
        if !open.is_empty() {
            return Ok(StepFlow::Paused(open.len()));
        }

        if report.failed > 0 || report.blocked > 0 {
            let stuck = tasks
                .iter()
                .find(|t| t.status == TaskStatus::Failed)
                .or_else(|| tasks.iter().find(|t| t.status == TaskStatus::Blocked));
            let (task_id, dep) = stuck
                .map(|t| {
                    (
                        t.id.to_string(),
                        t.dependencies
                            .first()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    )
                })
                .unwrap_or_default();
            return Err(OrchestratorError::DependencyFailed {
                task_id,
                dependency_id: dep,
            });
        }

        Err(OrchestratorError::Internal(
            "dispatch deadlock: pending tasks with unmet dependencies".to_string(),
        ))
    }

    async fn step_ui_inference(
        &self,
        swarm: &Swarm,
        scope: &Scope,
        ctx: &mut StepContext,
    ) -> DomainResult<StepFlow> {
        let (frontend_artifact, backend_artifact, _) = self.collect_artifacts(swarm.id).await?;

        let stack = scope
            .stack_inference
            .as_ref()
            .map(|s| format!("{} / {} / {}", s.frontend, s.backend, s.database))
            .unwrap_or_else(|| "unspecified".to_string());

        let request = CompletionRequest::new(format!(
            "Produce a UI plan for this project.\n\n## Stack\n{stack}\n\n\
             ## Frontend artifacts\n{frontend_artifact}\n\n## Backend artifacts\n{backend_artifact}\n\n\
             Respond with JSON: {{\"components\": [...], \"constraints\": \
             {{\"responsive\": true, \"wcag\": \"2.1\", \"theme\": \"...\"}}, \
             \"hooks\": [\"...\"], \"needs_review\": false}}. Output ONLY JSON."
        ))
        .with_system("You design UI plans that match an existing backend contract.");

        let (plan, response) = self.gateway.complete_json::<UiPlan>(request).await?;
        self.cost.record(swarm.id, response.tokens_used);

        tracing::info!(
            components_count = plan.components.len(),
            needs_review = plan.needs_review,
            "ui.inference"
        );

        let value = serde_json::to_value(&plan)?;
        ctx.ui_plan = Some(value.clone());
        Ok(StepFlow::Done(value))
    }

    async fn step_visual_test(&self, swarm: &Swarm, ctx: &mut StepContext) -> DomainResult<StepFlow> {
        let ui_plan = ctx
            .ui_plan
            .clone()
            .ok_or_else(|| OrchestratorError::Internal("no UI plan for visual test".into()))?;

        let agent_id = self
            .agent_repo
            .list_by_swarm(swarm.id)
            .await?
            .first()
            .map(|a| a.id)
            .unwrap_or_else(Uuid::new_v4);

        let result = self
            .tools
            .call(
                ToolCall::new("visual_test", json!({"ui_plan": ui_plan})),
                ToolContext { swarm_id: swarm.id, agent_id },
            )
            .await?;

        let diff_score = result
            .get("diff_score")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0);
        let wcag_violations = result
            .get("wcag_violations")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(u64::MAX);

        self.metrics.observe_histogram(names::VISUAL_DIFF_SCORE, diff_score);
        tracing::info!(visual_diff_score = diff_score, wcag_violations, "visual.test");

        if diff_score < self.config.visual_diff_max && wcag_violations == 0 {
            Ok(StepFlow::Done(json!({
                "diff_score": diff_score,
                "wcag_violations": wcag_violations,
            })))
        } else {
            Err(OrchestratorError::Internal(format!(
                "visual test failed: diff {diff_score:.3}, {wcag_violations} WCAG violations"
            )))
        }
    }

    async fn step_conflict_resolution(
        &self,
        swarm: &Swarm,
        ctx: &mut StepContext,
    ) -> DomainResult<StepFlow> {
        let ui_text = ctx
            .ui_plan
            .as_ref()
            .map(ToString::to_string)
            .ok_or_else(|| OrchestratorError::Internal("no UI plan for conflict check".into()))?;
        let (_, backend_artifact, _) = self.collect_artifacts(swarm.id).await?;

        let (similarity, should_mediate) =
            self.conflicts.detect_conflict(&ui_text, &backend_artifact).await?;
        tracing::info!(conflict_similarity = similarity, should_mediate, "conflict.check");

        if !should_mediate {
            return Ok(StepFlow::Done(json!({
                "similarity": similarity,
                "mediated": false,
            })));
        }

        let mediation = self
            .conflicts
            .mediate(swarm.id, &ui_text, &backend_artifact, similarity)
            .await?;

        // The revised artifact replaces the UI plan downstream.
        if let Ok(revised) = serde_json::from_str::<serde_json::Value>(
            &crate::infrastructure::llm::extract_json(&mediation.fixed_artifact),
        ) {
            ctx.ui_plan = Some(revised);
        }

        Ok(StepFlow::Done(json!({
            "similarity": mediation.pre_similarity,
            "post_similarity": mediation.post_similarity,
            "mediated": true,
        })))
    }

    async fn step_test_gate(&self, swarm: &Swarm) -> DomainResult<StepFlow> {
        let (_, _, coverage) = self.collect_artifacts(swarm.id).await?;
        let coverage = coverage.unwrap_or(0.0);

        if coverage >= self.config.coverage_gate_pct {
            Ok(StepFlow::Done(json!({"coverage_pct": coverage})))
        } else {
            Err(OrchestratorError::Internal(format!(
                "test gate failed: coverage {coverage:.1}% below {:.1}%",
                self.config.coverage_gate_pct
            )))
        }
    }

    async fn step_slo_enforce(
        &self,
        swarm: &Swarm,
        scope: &Scope,
        ctx: &mut StepContext,
    ) -> DomainResult<StepFlow> {
        let latency = chrono::Utc::now()
            .signed_duration_since(swarm.created_at)
            .num_milliseconds() as f64
            / 1000.0;

        let inputs = SloInputs {
            cost_usd: self.cost.cost_usd(swarm.id, self.config.rate_per_k_tokens),
            latency_seconds: latency,
            coverage_pct: ctx.coverage_pct,
            stack_confidence: scope.stack_inference.as_ref().map(|s| s.confidence),
        };

        let report = self.slo_gate.evaluate(swarm.id, &inputs).await?;
        let report_value = serde_json::to_value(&report)?;

        // Persist the report so failure responses carry the breach record.
        let mut metadata = self
            .swarm_repo
            .get(swarm.id)
            .await?
            .map(|s| s.metadata)
            .unwrap_or_else(|| json!({}));
        if let serde_json::Value::Object(map) = &mut metadata {
            map.insert("slo_report".to_string(), report_value.clone());
        }
        self.swarm_repo.update_metadata(swarm.id, metadata).await?;

        if let Some(breach) = report.hard_breach() {
            return Err(SloGate::breach_error(breach));
        }
        if let Some(breach) = report.retryable_breach() {
            return Err(OrchestratorError::Internal(format!(
                "retryable SLO breach: {} at {:.2} against {:.2}",
                breach.slo, breach.actual, breach.threshold
            )));
        }

        Ok(StepFlow::Done(report_value))
    }

    async fn step_finalize(&self, swarm: &Swarm) -> DomainResult<StepFlow> {
        self.set_status(swarm.id, SwarmStatus::Completed).await?;

        let complexity = self.complexity_label(swarm.id).await;
        let duration = chrono::Utc::now()
            .signed_duration_since(swarm.created_at)
            .num_milliseconds() as f64
            / 1000.0;

        self.metrics.incr_counter(
            names::WORKFLOWS_COMPLETED,
            1,
            &[("complexity", complexity.as_str())],
        );

        let report = self.scheduler.progress(swarm.id).await?;
        Ok(StepFlow::Done(json!({
            "status": "completed",
            "duration_seconds": duration,
            "tasks_completed": report.completed,
            "tasks_total": report.total,
            "tokens_used": self.cost.tokens_for(swarm.id),
        })))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Gather produced artifacts: frontend text, backend text, and the best
    /// reported coverage.
    async fn collect_artifacts(
        &self,
        swarm_id: Uuid,
    ) -> DomainResult<(String, String, Option<f64>)> {
        let tasks = self.task_repo.list(swarm_id, TaskFilter::default()).await?;

        let mut frontend = Vec::new();
        let mut backend = Vec::new();
        let mut coverage: Option<f64> = None;

        for task in &tasks {
            if task.status != TaskStatus::Completed {
                continue;
            }
            let role = task.data.get("role").and_then(serde_json::Value::as_str);
            if let Some(artifact) = task.data.get("artifact") {
                match role {
                    Some("frontend_architect") => frontend.push(artifact.to_string()),
                    Some("backend_integrator" | "api_designer" | "data_modeler") => {
                        backend.push(artifact.to_string());
                    }
                    _ => {}
                }
            }
            if let Some(c) = task.data.get("coverage_pct").and_then(serde_json::Value::as_f64) {
                coverage = Some(coverage.map_or(c, |prev: f64| prev.max(c)));
            }
        }

        Ok((frontend.join("\n"), backend.join("\n"), coverage))
    }

    /// Compare-and-swap status update with re-read on conflict. Reaching a
    /// state that cannot legally transition (already terminal, or already at
    /// the target) is treated as settled.
    async fn set_status(&self, swarm_id: Uuid, status: SwarmStatus) -> DomainResult<()> {
        loop {
            let swarm = self
                .swarm_repo
                .get(swarm_id)
                .await?
                .ok_or(OrchestratorError::SwarmNotFound(swarm_id))?;

            if swarm.status == status || !swarm.status.can_transition_to(status) {
                return Ok(());
            }

            match self
                .swarm_repo
                .update_status(swarm_id, status, swarm.version)
                .await
            {
                Ok(()) => return Ok(()),
                Err(OrchestratorError::ConcurrencyConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancellation drain: stop dispatching, skip remaining work, release
    /// locks, and settle the swarm in `cancelled`. Idempotent; also the
    /// entry point for cancelling a swarm with no live run.
    pub async fn handle_cancel(&self, swarm_id: Uuid) -> DomainResult<WorkflowOutcome> {
        let tasks = self.task_repo.list(swarm_id, TaskFilter::default()).await?;
        for task in tasks {
            if matches!(
                task.status,
                TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Blocked
                    | TaskStatus::Failed
            ) {
                self.task_repo
                    .update_status(swarm_id, &task.id, TaskStatus::Skipped, None)
                    .await?;
            }
        }

        self.conflicts.release_all(swarm_id).await?;
        self.set_status(swarm_id, SwarmStatus::Cancelled).await?;

        tracing::info!(%swarm_id, "Workflow cancelled");
        Ok(WorkflowOutcome::Cancelled)
    }

    async fn fail_workflow(
        &self,
        swarm_id: Uuid,
        step: WorkflowStep,
        err: OrchestratorError,
    ) -> DomainResult<WorkflowOutcome> {
        tracing::error!(%swarm_id, step = step.as_str(), error = %err, "Workflow failed");

        self.set_status(swarm_id, SwarmStatus::Failed).await?;

        let complexity = self.complexity_label(swarm_id).await;
        self.metrics
            .incr_counter(names::WORKFLOWS_FAILED, 1, &[("complexity", complexity.as_str())]);

        Err(err)
    }

    async fn complexity_label(&self, swarm_id: Uuid) -> String {
        self.swarm_repo
            .get(swarm_id)
            .await
            .ok()
            .flatten()
            .and_then(|s| {
                s.metadata
                    .get("complexity")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from)
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}
