//! Scheduler ordering and combined start checks against the store.

mod common;

use common::Harness;
use hivemind::domain::models::{Agent, AgentRole, Swarm, Task, TaskId, TaskStatus};
use hivemind::domain::ports::{AgentRepository, SwarmRepository, TaskRepository};
use uuid::Uuid;

async fn seeded(harness: &Harness) -> Swarm {
    let swarm = Swarm::new("sched", 2);
    harness.swarm_repo.create(&swarm).await.unwrap();
    swarm
}

#[tokio::test]
async fn ready_tasks_order_by_priority_then_dependents() {
    let harness = Harness::new().await;
    let swarm = seeded(&harness).await;

    // Low priority
    let low = Task::new("1.1", swarm.id, "low", "d").with_priority(2);
    // High priority, no dependents
    let high_leaf = Task::new("2.1", swarm.id, "high leaf", "d").with_priority(8);
    // High priority with a downstream dependent; equal priority ties break
    // toward fewer dependents, so the leaf goes first.
    let high_chain = Task::new("3.1", swarm.id, "high chain", "d").with_priority(8);
    let downstream = Task::new("3.2", swarm.id, "after", "d")
        .with_priority(5)
        .with_dependency("3.1");

    for task in [&low, &high_leaf, &high_chain, &downstream] {
        harness.task_repo.create(task).await.unwrap();
    }

    let ready = harness.scheduler.ready_tasks(swarm.id).await.unwrap();
    let ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["2.1", "3.1", "1.1"]);
}

#[tokio::test]
async fn occupied_agents_are_skipped() {
    let harness = Harness::new().await;
    let swarm = seeded(&harness).await;

    let mut agent = Agent::new(swarm.id, AgentRole::FrontendArchitect);
    agent.start_task(TaskId::new("9.9"));
    harness.agent_repo.create(&agent).await.unwrap();

    let task = Task::new("1.1", swarm.id, "t", "d").with_agent(agent.id);
    harness.task_repo.create(&task).await.unwrap();

    assert!(harness.scheduler.ready_tasks(swarm.id).await.unwrap().is_empty());

    // Free the agent and the task becomes ready
    agent.finish_task();
    harness.agent_repo.update_state(agent.id, &agent.state).await.unwrap();
    assert_eq!(harness.scheduler.ready_tasks(swarm.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn can_agent_start_combines_checks() {
    let harness = Harness::new().await;
    let swarm = seeded(&harness).await;
    let agent_id = Uuid::new_v4();

    let mut dep = Task::new("1.1", swarm.id, "dep", "d");
    dep.transition_to(TaskStatus::InProgress).unwrap();
    harness.task_repo.create(&dep).await.unwrap();

    let task = Task::new("1.2", swarm.id, "t", "d")
        .with_dependency("1.1")
        .with_agent(agent_id);
    harness.task_repo.create(&task).await.unwrap();

    // Dependency still running
    let (ok, reason) = harness
        .scheduler
        .can_agent_start(swarm.id, agent_id, &TaskId::new("1.2"))
        .await
        .unwrap();
    assert!(!ok);
    assert!(reason.unwrap().contains("dependencies"));

    // Complete the dependency
    harness
        .task_repo
        .update_status(swarm.id, &TaskId::new("1.1"), TaskStatus::Completed, None)
        .await
        .unwrap();
    let (ok, _) = harness
        .scheduler
        .can_agent_start(swarm.id, agent_id, &TaskId::new("1.2"))
        .await
        .unwrap();
    assert!(ok);

    // A different agent cannot take an owned task
    let (ok, reason) = harness
        .scheduler
        .can_agent_start(swarm.id, Uuid::new_v4(), &TaskId::new("1.2"))
        .await
        .unwrap();
    assert!(!ok);
    assert!(reason.unwrap().contains("owned"));

    // Unknown task
    let (ok, _) = harness
        .scheduler
        .can_agent_start(swarm.id, agent_id, &TaskId::new("nope"))
        .await
        .unwrap();
    assert!(!ok);

    // A failed dependency blocks via the conflict resolver too
    harness
        .conflicts
        .on_task_failed(swarm.id, &TaskId::new("7.7"), agent_id)
        .await
        .unwrap();
    let blocked_task = Task::new("7.8", swarm.id, "t", "d")
        .with_dependency("7.7")
        .with_agent(agent_id);
    harness.task_repo.create(&blocked_task).await.unwrap();
    let mut failed_dep = Task::new("7.7", swarm.id, "dead", "d");
    failed_dep.transition_to(TaskStatus::InProgress).unwrap();
    failed_dep.fail("x").unwrap();
    harness.task_repo.create(&failed_dep).await.unwrap();

    let (ok, reason) = harness
        .scheduler
        .can_agent_start(swarm.id, agent_id, &TaskId::new("7.8"))
        .await
        .unwrap();
    assert!(!ok);
    assert!(reason.unwrap().contains("7.7"));
}
