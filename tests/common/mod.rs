//! Shared test fixtures: a scripted LLM client, deterministic embeddings,
//! and a fully wired orchestrator over an in-memory database.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use hivemind::adapters::sqlite::{
    Database, SqliteAgentRepository, SqliteCheckpointRepository, SqliteEscalationRepository,
    SqliteEventRepository, SqliteSwarmRepository, SqliteTaskRepository, SqliteTemplateRepository,
};
use hivemind::domain::errors::{DomainResult, OrchestratorError};
use hivemind::domain::models::config::{GatewayConfig, SloConfig};
use hivemind::domain::models::{Swarm, SwarmStatus};
use hivemind::domain::ports::{
    CompletionRequest, CompletionResponse, LlmClient, MetricsSink, ToolRegistry,
};
use hivemind::infrastructure::llm::LlmGateway;
use hivemind::infrastructure::metrics::TracingMetricsSink;
use hivemind::services::{
    register_builtin_tools, AdaptivePlanner, AgentRunner, ConflictResolver, CostTracker,
    MonitorSettings, OrchestrationMonitor, Orchestrator, RetryManager, ScopeExtractor, SloGate,
    StackInferencer, TaskScheduler, WorkflowEngine, WorkflowEngineConfig, WorkflowTimeouts,
};

/// Keyword vocabulary for deterministic test embeddings. Presence of each
/// keyword is one dimension; a shared bias dimension keeps unrelated texts
/// at low-but-nonzero similarity.
const VOCAB: &[&str] = &[
    "todo", "task", "reminder", "subscription", "saas", "billing", "crud", "form", "record",
    "store", "catalog", "checkout", "cart", "order", "chart", "filter", "dashboard", "offline",
    "phone", "progressive", "chat", "messag", "websocket", "presence", "content", "publish",
    "blog", "back-office", "role", "graphql", "rest", "endpoint", "hook", "component", "next.js",
    "react", "stripe", "integration", "payment", "invoice",
];

/// Deterministic bag-of-keywords embedding.
pub fn embed_text(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = VOCAB
        .iter()
        .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
        .collect();
    vector.push(1.0); // bias
    vector
}

/// What a scripted rule does when its matcher hits.
pub enum ScriptAction {
    /// Return this completion text
    Text(String),
    /// Fail with a rate limit
    RateLimited,
    /// Fail with an unavailability error
    Unavailable(String),
}

struct Rule {
    matcher: String,
    action: ScriptAction,
    remaining: u32,
}

/// LLM client driven by substring-matched rules, first match wins.
/// Unmatched completions return a generic agent output.
pub struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    pub tokens_per_call: AtomicU64,
    pub fail_embeds: AtomicBool,
    /// Artificial latency per completion, for tests that need to observe
    /// a run mid-flight
    pub delay_ms: AtomicU64,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            tokens_per_call: AtomicU64::new(10),
            fail_embeds: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Prepend a rule so it takes priority over defaults.
    pub fn push_rule(&self, matcher: &str, action: ScriptAction, times: u32) {
        self.rules.lock().unwrap().insert(
            0,
            Rule { matcher: matcher.to_string(), action, remaining: times },
        );
    }

    /// Append a low-priority rule.
    pub fn push_default(&self, matcher: &str, action: ScriptAction) {
        self.rules.lock().unwrap().push(Rule {
            matcher: matcher.to_string(),
            action,
            remaining: u32::MAX,
        });
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let tokens = self.tokens_per_call.load(Ordering::Relaxed);
        let action_text = {
            let mut rules = self.rules.lock().unwrap();
            let hit = rules
                .iter_mut()
                .find(|r| r.remaining > 0 && request.user.contains(&r.matcher));
            match hit {
                Some(rule) => {
                    rule.remaining = rule.remaining.saturating_sub(1);
                    match &rule.action {
                        ScriptAction::Text(text) => Some(Ok(text.clone())),
                        ScriptAction::RateLimited => {
                            Some(Err(OrchestratorError::RateLimited { retry_after_secs: 0 }))
                        }
                        ScriptAction::Unavailable(msg) => {
                            Some(Err(OrchestratorError::LlmUnavailable(msg.clone())))
                        }
                    }
                }
                None => None,
            }
        };

        let text = match action_text {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => default_agent_output(),
        };

        Ok(CompletionResponse { text, tokens_used: tokens, model: "scripted".to_string() })
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        if self.fail_embeds.load(Ordering::Relaxed) {
            return Err(OrchestratorError::LlmUnavailable("embeddings down".to_string()));
        }
        Ok(embed_text(text))
    }
}

/// Generic successful agent output with passing coverage.
pub fn default_agent_output() -> String {
    r#"{"artifact": {"files": [], "summary": "rest endpoint implementation with react components"},
        "coverage_pct": 96.0, "notes": []}"#
        .to_string()
}

/// A scope extraction response for a small two-feature project.
pub fn simple_scope_json() -> String {
    r#"{
        "project_name": "todo-list",
        "goal": "Build a todo list with Next.js to track tasks with reminders",
        "tech_stack": {"frontend": "Next.js", "backend": "", "database": "",
                       "auth": "", "deployment": ""},
        "features": ["add tasks", "complete tasks"],
        "competitors": [],
        "timeline": "1 week",
        "scope_of_works": {"in_scope": [], "out_scope": [], "milestones": [],
                           "risks": [], "kpis": []},
        "estimates": {"integrations": 0, "pages": 2, "models": 1, "endpoints": 2}
    }"#
    .to_string()
}

/// A monster-scale extraction: 12 features, 5 integrations.
pub fn monster_scope_json() -> String {
    let features: Vec<String> = (1..=12).map(|i| format!("\"feature {i}\"")).collect();
    format!(
        r#"{{
        "project_name": "stripe-like-saas",
        "goal": "A payments SaaS with subscription billing and invoices",
        "tech_stack": {{"frontend": "", "backend": "", "database": "",
                        "auth": "", "deployment": ""}},
        "features": [{}],
        "competitors": ["stripe"],
        "timeline": "6 months",
        "scope_of_works": {{"in_scope": [], "out_scope": [], "milestones": [],
                            "risks": [], "kpis": []}},
        "estimates": {{"integrations": 5, "pages": 20, "models": 12, "endpoints": 25}}
    }}"#,
        features.join(", ")
    )
}

/// A compliant UI plan the visual-test builtin accepts.
pub fn ui_plan_json() -> String {
    r#"{
        "components": [{"name": "App"}, {"name": "TaskList"}],
        "constraints": {"responsive": true, "wcag": "2.1", "theme": "light"},
        "hooks": ["useItems calls rest endpoint"],
        "needs_review": false
    }"#
    .to_string()
}

/// Harness knobs. Defaults keep everything fast and green.
pub struct HarnessOptions {
    pub slo: SloConfig,
    pub coverage_gate_pct: f64,
    pub rate_per_k_tokens: f64,
    pub lock_ttl: Duration,
    pub conflict_threshold: f64,
    pub stack_threshold: f64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            slo: SloConfig::default(),
            coverage_gate_pct: 80.0,
            rate_per_k_tokens: 0.01,
            lock_ttl: Duration::from_secs(1800),
            conflict_threshold: 0.70,
            stack_threshold: 0.70,
        }
    }
}

/// Everything wired together over an in-memory database.
pub struct Harness {
    pub llm: Arc<ScriptedLlm>,
    pub gateway: Arc<LlmGateway>,
    pub metrics: Arc<TracingMetricsSink>,
    pub swarm_repo: Arc<SqliteSwarmRepository>,
    pub agent_repo: Arc<SqliteAgentRepository>,
    pub task_repo: Arc<SqliteTaskRepository>,
    pub event_repo: Arc<SqliteEventRepository>,
    pub escalation_repo: Arc<SqliteEscalationRepository>,
    pub template_repo: Arc<SqliteTemplateRepository>,
    pub checkpoint_repo: Arc<SqliteCheckpointRepository>,
    pub conflicts: Arc<ConflictResolver>,
    pub scheduler: Arc<TaskScheduler>,
    pub planner: Arc<AdaptivePlanner>,
    pub retry: Arc<RetryManager>,
    pub cost: Arc<CostTracker>,
    pub inferencer: Arc<StackInferencer>,
    pub extractor: Arc<ScopeExtractor>,
    pub engine: Arc<WorkflowEngine>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(HarnessOptions::default()).await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        let db = Database::open_in_memory().await.expect("test store");
        let pool = db.pool().clone();

        let swarm_repo = Arc::new(SqliteSwarmRepository::new(pool.clone()));
        let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let event_repo = Arc::new(SqliteEventRepository::new(pool.clone()));
        let escalation_repo = Arc::new(SqliteEscalationRepository::new(pool.clone()));
        let template_repo = Arc::new(SqliteTemplateRepository::new(pool.clone()));
        let checkpoint_repo = Arc::new(SqliteCheckpointRepository::new(pool.clone()));

        let metrics = Arc::new(TracingMetricsSink::new());
        let metrics_dyn: Arc<dyn MetricsSink> = metrics.clone();

        let llm = Arc::new(ScriptedLlm::new());
        llm.push_default("Produce a UI plan", ScriptAction::Text(ui_plan_json()));
        llm.push_default(
            "Choose a technology stack",
            ScriptAction::Text(
                r#"{"backend": "FastAPI", "frontend": "React",
                    "database": "PostgreSQL", "confidence": 0.6}"#
                    .to_string(),
            ),
        );

        // Transient gateway retries are disabled so task-level retry
        // behavior is observable.
        let gateway_config = GatewayConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            requests_per_second: 10_000.0,
            burst_size: 1_000,
        };
        let gateway = Arc::new(LlmGateway::new(
            llm.clone() as Arc<dyn LlmClient>,
            &gateway_config,
            metrics_dyn.clone(),
        ));

        let cost = Arc::new(CostTracker::new());
        let conflicts = Arc::new(ConflictResolver::new(
            event_repo.clone(),
            gateway.clone(),
            metrics_dyn.clone(),
            options.conflict_threshold,
            options.lock_ttl,
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            task_repo.clone(),
            agent_repo.clone(),
            conflicts.clone(),
        ));
        let planner = Arc::new(AdaptivePlanner::new(agent_repo.clone(), task_repo.clone()));
        let retry = Arc::new(
            RetryManager::new(metrics_dyn.clone())
                .with_delays(Duration::from_millis(5), Duration::from_millis(50)),
        );
        let runner = Arc::new(AgentRunner::new(gateway.clone(), conflicts.clone(), cost.clone()));
        let slo_gate = Arc::new(SloGate::new(
            options.slo.clone(),
            event_repo.clone(),
            metrics_dyn.clone(),
        ));
        let inferencer = Arc::new(StackInferencer::new(
            gateway.clone(),
            template_repo.clone(),
            metrics_dyn.clone(),
            options.stack_threshold,
        ));
        let extractor = Arc::new(ScopeExtractor::new(gateway.clone(), inferencer.clone()));

        let mut tool_registry = ToolRegistry::new();
        register_builtin_tools(&mut tool_registry);

        let engine = Arc::new(WorkflowEngine::new(
            swarm_repo.clone(),
            agent_repo.clone(),
            task_repo.clone(),
            event_repo.clone(),
            checkpoint_repo.clone(),
            escalation_repo.clone(),
            scheduler.clone(),
            planner.clone(),
            runner,
            conflicts.clone(),
            retry.clone(),
            slo_gate,
            cost.clone(),
            gateway.clone(),
            Arc::new(tool_registry),
            metrics_dyn,
            WorkflowEngineConfig {
                timeouts: WorkflowTimeouts {
                    dispatch_task: Duration::from_secs(10),
                    ..WorkflowTimeouts::default()
                },
                coverage_gate_pct: options.coverage_gate_pct,
                visual_diff_max: 0.05,
                rate_per_k_tokens: options.rate_per_k_tokens,
                step_retry_pause: Duration::from_millis(10),
            },
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            extractor.clone(),
            swarm_repo.clone(),
            escalation_repo.clone(),
            engine.clone(),
        ));

        Self {
            llm,
            gateway,
            metrics,
            swarm_repo,
            agent_repo,
            task_repo,
            event_repo,
            escalation_repo,
            template_repo,
            checkpoint_repo,
            conflicts,
            scheduler,
            planner,
            retry,
            cost,
            inferencer,
            extractor,
            engine,
            orchestrator,
        }
    }

    /// Build a monitor over this harness's repositories.
    pub fn monitor(&self, settings: MonitorSettings) -> OrchestrationMonitor {
        OrchestrationMonitor::new(
            self.swarm_repo.clone(),
            self.task_repo.clone(),
            self.event_repo.clone(),
            self.escalation_repo.clone(),
            self.conflicts.clone(),
            self.retry.clone(),
            self.metrics.clone(),
            settings,
        )
    }

    /// Poll until the swarm reaches a terminal status.
    pub async fn wait_for_terminal(&self, swarm_id: Uuid) -> Swarm {
        use hivemind::domain::ports::SwarmRepository;
        for _ in 0..600 {
            if let Some(swarm) = self.swarm_repo.get(swarm_id).await.expect("get swarm") {
                if swarm.status.is_terminal() {
                    return swarm;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("swarm {swarm_id} did not reach a terminal status");
    }

    /// Poll until the swarm reaches the given status.
    pub async fn wait_for_status(&self, swarm_id: Uuid, status: SwarmStatus) -> Swarm {
        use hivemind::domain::ports::SwarmRepository;
        for _ in 0..600 {
            if let Some(swarm) = self.swarm_repo.get(swarm_id).await.expect("get swarm") {
                if swarm.status == status {
                    return swarm;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("swarm {swarm_id} never reached {status:?}");
    }
}
