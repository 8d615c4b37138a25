//! SQLite repository behavior: optimistic concurrency, idempotent status
//! updates, cascade deletion, and template lookup.

mod common;

use common::Harness;
use hivemind::domain::errors::OrchestratorError;
use hivemind::domain::models::{
    Agent, AgentRole, Escalation, EscalationKind, EscalationStatus, EventKind, StackTemplate,
    Swarm, SwarmEvent, SwarmStatus, Task, TaskId, TaskStatus,
};
use hivemind::domain::ports::{
    AgentRepository, CheckpointRepository, EscalationRepository, EventRepository, SwarmRepository,
    TaskFilter, TaskRepository, TemplateRepository,
};
use serde_json::json;

async fn seeded_swarm(harness: &Harness) -> Swarm {
    let swarm = Swarm::new("fixture", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();
    swarm
}

#[tokio::test]
async fn swarm_round_trip_and_cas() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    let loaded = harness.swarm_repo.get(swarm.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "fixture");
    assert_eq!(loaded.status, SwarmStatus::Idle);
    assert_eq!(loaded.version, 1);

    // CAS succeeds at the stored version
    harness
        .swarm_repo
        .update_status(swarm.id, SwarmStatus::Running, 1)
        .await
        .unwrap();

    // A stale version loses the race
    let err = harness
        .swarm_repo
        .update_status(swarm.id, SwarmStatus::Completed, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ConcurrencyConflict { .. }));

    // Unknown swarm is not a conflict
    let err = harness
        .swarm_repo
        .update_status(uuid::Uuid::new_v4(), SwarmStatus::Running, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SwarmNotFound(_)));
}

#[tokio::test]
async fn task_status_update_is_idempotent() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    let task = Task::new("1.1", swarm.id, "t", "d");
    harness.task_repo.create(&task).await.unwrap();

    harness
        .task_repo
        .update_status(swarm.id, &task.id, TaskStatus::InProgress, None)
        .await
        .unwrap();
    harness
        .task_repo
        .update_status(swarm.id, &task.id, TaskStatus::Completed, Some(json!({"x": 1})))
        .await
        .unwrap();

    let after_first = harness.task_repo.get(swarm.id, &task.id).await.unwrap().unwrap();

    // Re-applying the same status is a no-op: no version bump, no
    // timestamp churn.
    harness
        .task_repo
        .update_status(swarm.id, &task.id, TaskStatus::Completed, None)
        .await
        .unwrap();
    let after_second = harness.task_repo.get(swarm.id, &task.id).await.unwrap().unwrap();

    assert_eq!(after_first.version, after_second.version);
    assert_eq!(after_first.updated_at, after_second.updated_at);
    assert_eq!(after_second.data["x"], 1);
}

#[tokio::test]
async fn invalid_status_jump_is_rejected() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;
    let task = Task::new("1.1", swarm.id, "t", "d");
    harness.task_repo.create(&task).await.unwrap();

    let err = harness
        .task_repo
        .update_status(swarm.id, &task.id, TaskStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn dependencies_round_trip() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    let dep = Task::new("1.1", swarm.id, "first", "d");
    let task = Task::new("1.2", swarm.id, "second", "d").with_dependency("1.1");
    harness.task_repo.create(&dep).await.unwrap();
    harness.task_repo.create(&task).await.unwrap();

    let loaded = harness.task_repo.get(swarm.id, &task.id).await.unwrap().unwrap();
    assert_eq!(loaded.dependencies, vec![TaskId::new("1.1")]);
}

#[tokio::test]
async fn cascade_delete_spares_events() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    let agent = Agent::new(swarm.id, AgentRole::FrontendArchitect);
    harness.agent_repo.create(&agent).await.unwrap();
    let task = Task::new("1.1", swarm.id, "t", "d");
    harness.task_repo.create(&task).await.unwrap();
    harness
        .event_repo
        .append(&SwarmEvent::new(swarm.id, EventKind::Decision, json!({"note": "kept"})))
        .await
        .unwrap();

    harness.swarm_repo.delete(swarm.id).await.unwrap();

    assert!(harness.swarm_repo.get(swarm.id).await.unwrap().is_none());
    assert!(harness.agent_repo.list_by_swarm(swarm.id).await.unwrap().is_empty());
    assert!(harness
        .task_repo
        .list(swarm.id, TaskFilter::default())
        .await
        .unwrap()
        .is_empty());

    // Events survive for postmortem
    let events = harness.event_repo.by_swarm(swarm.id).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn event_log_is_totally_ordered() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    for i in 0..5 {
        harness
            .event_repo
            .append(&SwarmEvent::new(swarm.id, EventKind::Learning, json!({"i": i})))
            .await
            .unwrap();
    }

    let events = harness.event_repo.by_swarm(swarm.id).await.unwrap();
    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
    assert_eq!(events[0].data["i"], 0);
    assert_eq!(events[4].data["i"], 4);
}

#[tokio::test]
async fn template_upsert_is_idempotent_and_nearest_orders() {
    let harness = Harness::new().await;

    let mut a = StackTemplate::new("alpha", "b", "f", "d", "todo tasks reminders");
    a.embedding = Some(common::embed_text(&a.description));
    let mut b = StackTemplate::new("beta", "b", "f", "d", "chat messaging websockets");
    b.embedding = Some(common::embed_text(&b.description));

    harness.template_repo.upsert(&a).await.unwrap();
    harness.template_repo.upsert(&a).await.unwrap(); // no duplicate
    harness.template_repo.upsert(&b).await.unwrap();
    assert_eq!(harness.template_repo.list().await.unwrap().len(), 2);

    let query = common::embed_text("a todo app for tasks");
    let nearest = harness.template_repo.nearest(&query, 2).await.unwrap();
    assert_eq!(nearest[0].0.title, "alpha");
    assert!(nearest[0].1 > nearest[1].1);
}

#[tokio::test]
async fn checkpoints_record_and_replay() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    assert!(harness
        .checkpoint_repo
        .get(swarm.id, "generate_plan")
        .await
        .unwrap()
        .is_none());

    harness
        .checkpoint_repo
        .save(swarm.id, "generate_plan", &json!({"total_tasks": 8}))
        .await
        .unwrap();
    // Overwrite is allowed and idempotent
    harness
        .checkpoint_repo
        .save(swarm.id, "generate_plan", &json!({"total_tasks": 8}))
        .await
        .unwrap();

    let value = harness
        .checkpoint_repo
        .get(swarm.id, "generate_plan")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value["total_tasks"], 8);
    assert_eq!(
        harness.checkpoint_repo.list_steps(swarm.id).await.unwrap(),
        vec!["generate_plan"]
    );
}

#[tokio::test]
async fn escalation_round_trip() {
    let harness = Harness::new().await;
    let swarm = seeded_swarm(&harness).await;

    let escalation = Escalation::new(swarm.id, EscalationKind::ExternalService, "provider down")
        .with_task(TaskId::new("2.1"))
        .with_suggested_actions(vec!["wait".into(), "swap provider".into()]);
    harness.escalation_repo.create(&escalation).await.unwrap();

    let open = harness
        .escalation_repo
        .list_by_swarm(swarm.id, Some(EscalationStatus::Pending))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].suggested_actions.len(), 2);

    let mut resolved = open.into_iter().next().unwrap();
    resolved.apply_resolution(json!({"action": "swap"})).unwrap();
    harness.escalation_repo.update(&resolved).await.unwrap();

    let open = harness
        .escalation_repo
        .list_by_swarm(swarm.id, Some(EscalationStatus::Pending))
        .await
        .unwrap();
    assert!(open.is_empty());
}
