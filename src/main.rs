//! Hivemind server entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use hivemind::adapters::sqlite::{
    Database, SqliteAgentRepository, SqliteCheckpointRepository, SqliteEscalationRepository,
    SqliteEventRepository, SqliteSwarmRepository, SqliteTaskRepository, SqliteTemplateRepository,
};
use hivemind::domain::ports::{MetricsSink, ToolRegistry};
use hivemind::infrastructure::config::ConfigLoader;
use hivemind::infrastructure::http::{serve, AppState};
use hivemind::infrastructure::llm::{LlmGateway, LlmHttpConfig, OpenRouterClient};
use hivemind::infrastructure::logging::init_tracing;
use hivemind::infrastructure::metrics::TracingMetricsSink;
use hivemind::services::{
    register_builtin_tools, AdaptivePlanner, AgentRunner, ConflictResolver, CostTracker,
    MonitorSettings, OrchestrationMonitor, Orchestrator, RetryManager, ScopeExtractor, SloGate,
    StackInferencer, TaskScheduler, WorkflowEngine, WorkflowEngineConfig, WorkflowTimeouts,
};

#[derive(Parser, Debug)]
#[command(name = "hivemind", about = "Autonomous multi-agent orchestrator")]
struct Cli {
    /// Path to a config file (overrides the .hivemind/ hierarchy)
    #[arg(long)]
    config: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Provider API key (or set HIVEMIND_API_KEY)
    #[arg(long, env = "HIVEMIND_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    tracing::info!("Starting hivemind orchestrator");

    // Database (opens, creates, and migrates in one step)
    let db = Database::open(&config.database.path, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let swarm_repo = Arc::new(SqliteSwarmRepository::new(pool.clone()));
    let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let event_repo = Arc::new(SqliteEventRepository::new(pool.clone()));
    let escalation_repo = Arc::new(SqliteEscalationRepository::new(pool.clone()));
    let template_repo = Arc::new(SqliteTemplateRepository::new(pool.clone()));
    let checkpoint_repo = Arc::new(SqliteCheckpointRepository::new(pool.clone()));

    // Observability
    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink::new());

    // LLM gateway
    let llm_client = Arc::new(OpenRouterClient::new(LlmHttpConfig {
        api_key: cli.api_key.unwrap_or_default(),
        model: config.llm.model.clone(),
        ..LlmHttpConfig::default()
    }));
    let gateway = Arc::new(LlmGateway::new(llm_client, &config.gateway, Arc::clone(&metrics)));

    // Services
    let cost = Arc::new(CostTracker::new());
    let conflicts = Arc::new(ConflictResolver::new(
        event_repo.clone(),
        Arc::clone(&gateway),
        Arc::clone(&metrics),
        config.conflict.similarity_threshold,
        Duration::from_secs(config.file_lock.ttl_seconds),
    ));
    let scheduler = Arc::new(TaskScheduler::new(
        task_repo.clone(),
        agent_repo.clone(),
        Arc::clone(&conflicts),
    ));
    let planner = Arc::new(AdaptivePlanner::new(agent_repo.clone(), task_repo.clone()));
    let retry = Arc::new(RetryManager::new(Arc::clone(&metrics)));
    let runner = Arc::new(AgentRunner::new(
        Arc::clone(&gateway),
        Arc::clone(&conflicts),
        Arc::clone(&cost),
    ));
    let slo_gate = Arc::new(SloGate::new(
        config.slo.clone(),
        event_repo.clone(),
        Arc::clone(&metrics),
    ));
    let inferencer = Arc::new(StackInferencer::new(
        Arc::clone(&gateway),
        template_repo.clone(),
        Arc::clone(&metrics),
        config.stack.similarity_threshold,
    ));
    let extractor = Arc::new(ScopeExtractor::new(Arc::clone(&gateway), Arc::clone(&inferencer)));

    let mut tool_registry = ToolRegistry::new();
    register_builtin_tools(&mut tool_registry);
    let tools = Arc::new(tool_registry);

    let engine = Arc::new(WorkflowEngine::new(
        swarm_repo.clone(),
        agent_repo.clone(),
        task_repo.clone(),
        event_repo.clone(),
        checkpoint_repo.clone(),
        escalation_repo.clone(),
        Arc::clone(&scheduler),
        Arc::clone(&planner),
        Arc::clone(&runner),
        Arc::clone(&conflicts),
        Arc::clone(&retry),
        Arc::clone(&slo_gate),
        Arc::clone(&cost),
        Arc::clone(&gateway),
        tools,
        Arc::clone(&metrics),
        WorkflowEngineConfig {
            timeouts: WorkflowTimeouts {
                dispatch_task: Duration::from_secs(config.task.timeout_seconds),
                ..WorkflowTimeouts::default()
            },
            coverage_gate_pct: config.workflow.coverage_gate_pct,
            visual_diff_max: config.workflow.visual_diff_max,
            rate_per_k_tokens: config.llm.rate_per_k_tokens,
            ..WorkflowEngineConfig::default()
        },
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&extractor),
        swarm_repo.clone(),
        escalation_repo.clone(),
        Arc::clone(&engine),
    ));

    // Seed the template corpus (idempotent; degrades without embeddings)
    if let Err(e) = inferencer.seed_corpus().await {
        tracing::warn!(error = %e, "Template seeding incomplete");
    }

    // Background monitor with clean shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = OrchestrationMonitor::new(
        swarm_repo.clone(),
        task_repo.clone(),
        event_repo.clone(),
        escalation_repo.clone(),
        Arc::clone(&conflicts),
        Arc::clone(&retry),
        Arc::clone(&metrics),
        MonitorSettings {
            tick: Duration::from_secs(config.monitor.tick_seconds),
            task_timeout: Duration::from_secs(config.task.timeout_seconds),
            ..MonitorSettings::default()
        },
    );
    let monitor_handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        swarm_repo,
        task_repo,
        escalation_repo,
        scheduler,
        conflicts,
    };

    let host = config.server.host.clone();
    let port = config.server.port;
    tokio::select! {
        result = serve(state, &host, port) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // Cancel outstanding workflow runs before stopping the monitor so
    // dispatches drain (locks released, remaining tasks skipped) instead of
    // being dropped mid-await.
    orchestrator.shutdown().await;
    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    tracing::info!("Orchestrator stopped");
    Ok(())
}
