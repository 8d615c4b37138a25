//! Monitor healing passes: retries, stall timeouts, dependency blocking,
//! and resumption after escalation resolution.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::Harness;
use hivemind::domain::models::{
    Escalation, EscalationKind, EventKind, Swarm, Task, TaskId, TaskStatus,
};
use hivemind::domain::ports::{
    EscalationRepository, EventRepository, SwarmRepository, TaskRepository,
};
use hivemind::services::MonitorSettings;

fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        tick: Duration::from_millis(10),
        task_timeout: Duration::from_millis(50),
        retry_base: Duration::from_millis(1),
    }
}

async fn swarm_with_task(harness: &Harness, task: Task) -> Swarm {
    let swarm = Swarm::new("monitored", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();
    let mut task = task;
    task.swarm_id = swarm.id;
    harness.task_repo.create(&task).await.unwrap();
    swarm
}

#[tokio::test]
async fn failed_task_with_budget_is_requeued() {
    let harness = Harness::new().await;
    let mut task = Task::new("1.1", uuid::Uuid::nil(), "t", "d");
    task.transition_to(TaskStatus::InProgress).unwrap();
    task.fail("boom").unwrap();
    task.failed_at = Some(Utc::now() - chrono::Duration::seconds(60));
    let swarm = swarm_with_task(&harness, task).await;

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.retries_issued, 1);

    let task = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    // Attempts never decrease across the retry reset
    assert_eq!(task.attempts, 1);

    let retries = harness.event_repo.by_kind(swarm.id, EventKind::Retry).await.unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].data["source"], "monitor");
}

#[tokio::test]
async fn exhausted_task_is_not_requeued() {
    let harness = Harness::new().await;
    let mut task = Task::new("1.1", uuid::Uuid::nil(), "t", "d");
    task.max_attempts = 1;
    task.transition_to(TaskStatus::InProgress).unwrap();
    task.fail("boom").unwrap();
    task.failed_at = Some(Utc::now() - chrono::Duration::seconds(60));
    let swarm = swarm_with_task(&harness, task).await;

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.retries_issued, 0);

    let task = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}

#[tokio::test]
async fn error_kind_budget_caps_requeues() {
    let harness = Harness::new().await;

    // A recoverable-code failure has a policy budget of 2. With two
    // attempts already spent, the monitor must not resurrect it even
    // though the task's generic limit would allow three more.
    let mut spent = Task::new("1.1", uuid::Uuid::nil(), "spent", "d");
    spent.transition_to(TaskStatus::InProgress).unwrap();
    spent.fail("SyntaxError: unexpected token in app.tsx").unwrap();
    spent.attempts = 2;
    spent.failed_at = Some(Utc::now() - chrono::Duration::seconds(60));
    assert_eq!(spent.max_attempts, 5);

    // The same error with one attempt spent is still within budget.
    let mut retryable = Task::new("2.1", uuid::Uuid::nil(), "retryable", "d");
    retryable.transition_to(TaskStatus::InProgress).unwrap();
    retryable.fail("SyntaxError: unexpected token in app.tsx").unwrap();
    retryable.failed_at = Some(Utc::now() - chrono::Duration::seconds(60));

    let swarm = Swarm::new("monitored", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();
    for task in [&mut spent, &mut retryable] {
        task.swarm_id = swarm.id;
        harness.task_repo.create(task).await.unwrap();
    }

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.retries_issued, 1);

    let spent = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(spent.status, TaskStatus::Failed);

    let retryable = harness
        .task_repo
        .get(swarm.id, &TaskId::new("2.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retryable.status, TaskStatus::Pending);
}

#[tokio::test]
async fn backoff_defers_fresh_failures() {
    let harness = Harness::new().await;
    let settings = MonitorSettings {
        retry_base: Duration::from_secs(3600),
        ..fast_settings()
    };
    let mut task = Task::new("1.1", uuid::Uuid::nil(), "t", "d");
    task.transition_to(TaskStatus::InProgress).unwrap();
    task.fail("boom").unwrap();
    let swarm = swarm_with_task(&harness, task).await;

    // Backoff window has not elapsed yet
    let stats = harness.monitor(settings).tick().await.unwrap();
    assert_eq!(stats.retries_issued, 0);
    let task = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}

#[tokio::test]
async fn stalled_task_times_out_and_frees_locks() {
    let harness = Harness::new().await;
    let agent_id = uuid::Uuid::new_v4();
    let mut task = Task::new("1.1", uuid::Uuid::nil(), "t", "d").with_agent(agent_id);
    task.transition_to(TaskStatus::InProgress).unwrap();
    task.started_at = Some(Utc::now() - chrono::Duration::seconds(60));
    let swarm = swarm_with_task(&harness, task).await;

    harness
        .conflicts
        .acquire_lock(swarm.id, "src/x.rs", agent_id)
        .await
        .unwrap();

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.timeouts_declared, 1);

    let task = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.data["reason"], "timeout");
    assert_eq!(harness.conflicts.active_locks(), 0);
}

#[tokio::test]
async fn pending_behind_permanent_failure_is_blocked() {
    let harness = Harness::new().await;
    let swarm = Swarm::new("monitored", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();

    let mut dead = Task::new("1.1", swarm.id, "dead", "d");
    dead.max_attempts = 1;
    dead.transition_to(TaskStatus::InProgress).unwrap();
    dead.fail("permanent").unwrap();
    harness.task_repo.create(&dead).await.unwrap();

    let waiting = Task::new("1.2", swarm.id, "waiting", "d").with_dependency("1.1");
    harness.task_repo.create(&waiting).await.unwrap();

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.tasks_blocked, 1);

    let waiting = harness
        .task_repo
        .get(swarm.id, &TaskId::new("1.2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(waiting.status, TaskStatus::Blocked);
}

#[tokio::test]
async fn blocked_task_resumes_after_escalation_resolved() {
    let harness = Harness::new().await;
    let swarm = Swarm::new("monitored", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();

    let mut blocked = Task::new("2.1", swarm.id, "blocked", "d");
    blocked.transition_to(TaskStatus::Blocked).unwrap();
    harness.task_repo.create(&blocked).await.unwrap();

    let escalation = Escalation::new(swarm.id, EscalationKind::Configuration, "need key")
        .with_task(TaskId::new("2.1"));
    harness.escalation_repo.create(&escalation).await.unwrap();

    // Outstanding escalation keeps it blocked
    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.tasks_resumed, 0);

    // Resolve and tick again
    let mut resolved = escalation;
    resolved.apply_resolution(serde_json::json!({"key": "value"})).unwrap();
    harness.escalation_repo.update(&resolved).await.unwrap();

    let stats = harness.monitor(fast_settings()).tick().await.unwrap();
    assert_eq!(stats.tasks_resumed, 1);

    let task = harness
        .task_repo
        .get(swarm.id, &TaskId::new("2.1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn monitor_loop_shuts_down_cleanly() {
    let harness = Harness::new().await;
    let monitor = harness.monitor(fast_settings());

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { monitor.run(rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor should stop on signal")
        .unwrap();
}
