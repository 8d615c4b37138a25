//! Background orchestration monitor.
//!
//! A single cooperative loop that heals stalled executions: it re-queues
//! retry-eligible failures once their backoff has elapsed, times out stuck
//! tasks, propagates permanent dependency failures, resumes tasks whose
//! escalations were resolved, and publishes health stats. Shutdown is
//! observed between ticks; the current tick always finishes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    EscalationStatus, EventKind, SwarmEvent, SwarmStatus, TaskStatus,
};
use crate::domain::ports::metrics::names;
use crate::domain::ports::{
    EscalationRepository, EventRepository, MetricsSink, SwarmRepository, TaskFilter,
    TaskRepository,
};

use super::conflict_resolver::ConflictResolver;
use super::retry_manager::RetryManager;
use super::scheduler::TaskScheduler;

/// Health stats computed each tick.
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub retries_issued: u64,
    pub timeouts_declared: u64,
    pub tasks_blocked: u64,
    pub tasks_resumed: u64,
}

/// Configuration for the monitor loop.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick: Duration,
    /// A task in progress longer than this is stalled
    pub task_timeout: Duration,
    /// Base for the retry-eligibility backoff check
    pub retry_base: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            task_timeout: Duration::from_secs(1800),
            retry_base: Duration::from_secs(2),
        }
    }
}

/// The self-healing background loop.
pub struct OrchestrationMonitor {
    swarm_repo: Arc<dyn SwarmRepository>,
    task_repo: Arc<dyn TaskRepository>,
    events: Arc<dyn EventRepository>,
    escalations: Arc<dyn EscalationRepository>,
    conflicts: Arc<ConflictResolver>,
    retry: Arc<RetryManager>,
    metrics: Arc<dyn MetricsSink>,
    settings: MonitorSettings,
}

impl OrchestrationMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        swarm_repo: Arc<dyn SwarmRepository>,
        task_repo: Arc<dyn TaskRepository>,
        events: Arc<dyn EventRepository>,
        escalations: Arc<dyn EscalationRepository>,
        conflicts: Arc<ConflictResolver>,
        retry: Arc<RetryManager>,
        metrics: Arc<dyn MetricsSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            swarm_repo,
            task_repo,
            events,
            escalations,
            conflicts,
            retry,
            metrics,
            settings,
        }
    }

    /// Run until the shutdown signal flips. The in-flight tick completes
    /// before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(tick_secs = self.settings.tick.as_secs(), "Monitor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Monitor tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One healing pass over every active swarm.
    pub async fn tick(&self) -> DomainResult<MonitorStats> {
        let mut stats = MonitorStats::default();

        let swarms = self.swarm_repo.list().await?;
        for swarm in swarms {
            if matches!(
                swarm.status,
                SwarmStatus::Completed | SwarmStatus::Failed | SwarmStatus::Cancelled
                    | SwarmStatus::Paused
            ) {
                continue;
            }
            self.heal_swarm(swarm.id, &mut stats).await?;
        }

        if stats.retries_issued > 0 || stats.timeouts_declared > 0 || stats.tasks_blocked > 0 {
            tracing::info!(
                retries = stats.retries_issued,
                timeouts = stats.timeouts_declared,
                blocked = stats.tasks_blocked,
                resumed = stats.tasks_resumed,
                "Monitor interventions"
            );
        }

        Ok(stats)
    }

    async fn heal_swarm(&self, swarm_id: Uuid, stats: &mut MonitorStats) -> DomainResult<()> {
        let tasks = self.task_repo.list(swarm_id, TaskFilter::default()).await?;
        let by_id: std::collections::HashMap<_, _> =
            tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
        let now = Utc::now();

        for task in &tasks {
            match task.status {
                // 1. Failed with budget left and backoff elapsed -> retry.
                // The budget is the error kind's policy maximum (classified
                // from the stored failure text), so a task the retry
                // manager gave up on is never resurrected here.
                TaskStatus::Failed if task.attempts < self.retry.budget_for(task) => {
                    let backoff = self
                        .settings
                        .retry_base
                        .saturating_mul(2_u32.saturating_pow(task.attempts.saturating_sub(1).min(31)));
                    let eligible = task.failed_at.is_none_or(|failed_at| {
                        now.signed_duration_since(failed_at)
                            .to_std()
                            .map(|age| age >= backoff)
                            .unwrap_or(true)
                    });
                    if eligible {
                        self.task_repo
                            .update_status(swarm_id, &task.id, TaskStatus::Pending, None)
                            .await?;
                        self.conflicts.clear_failed(swarm_id, &task.id);
                        self.events
                            .append(&SwarmEvent::new(
                                swarm_id,
                                EventKind::Retry,
                                json!({
                                    "task_id": task.id,
                                    "attempt": task.attempts,
                                    "source": "monitor",
                                }),
                            ))
                            .await?;
                        self.metrics.incr_counter(
                            names::TASK_RETRIES_TOTAL,
                            1,
                            &[("kind", "monitor")],
                        );
                        stats.retries_issued += 1;
                    }
                }

                // 2. In progress past the stall timeout -> fail with timeout
                TaskStatus::InProgress => {
                    let stalled = task.started_at.is_some_and(|started| {
                        now.signed_duration_since(started)
                            .to_std()
                            .map(|age| age > self.settings.task_timeout)
                            .unwrap_or(false)
                    });
                    if stalled {
                        tracing::warn!(task_id = %task.id, "Task stalled, declaring timeout");
                        self.task_repo
                            .update_status(
                                swarm_id,
                                &task.id,
                                TaskStatus::Failed,
                                Some(json!({"reason": "timeout"})),
                            )
                            .await?;
                        if let Some(agent_id) = task.agent_id {
                            self.conflicts
                                .on_task_failed(swarm_id, &task.id, agent_id)
                                .await?;
                        }
                        stats.timeouts_declared += 1;
                    }
                }

                // 3. Pending behind a permanently failed dependency -> blocked
                TaskStatus::Pending => {
                    let permanently_failed = task.dependencies.iter().any(|dep| {
                        by_id.get(dep).is_some_and(|d| {
                            d.status == TaskStatus::Failed && d.attempts >= d.max_attempts
                        })
                    });
                    if permanently_failed {
                        self.task_repo
                            .update_status(swarm_id, &task.id, TaskStatus::Blocked, None)
                            .await?;
                        stats.tasks_blocked += 1;
                    }
                }

                // Resumption: blocked tasks whose escalations have all been
                // resolved go back to pending.
                TaskStatus::Blocked => {
                    let open = self
                        .escalations
                        .list_by_swarm(swarm_id, Some(EscalationStatus::Pending))
                        .await?;
                    let task_has_open = open.iter().any(|e| e.task_id.as_ref() == Some(&task.id));
                    let dep_failed = TaskScheduler::has_failed_dependency(task, &by_id).is_some();
                    if !task_has_open && !dep_failed {
                        self.task_repo
                            .update_status(swarm_id, &task.id, TaskStatus::Pending, None)
                            .await?;
                        stats.tasks_resumed += 1;
                    }
                }

                _ => {}
            }
        }

        Ok(())
    }
}
