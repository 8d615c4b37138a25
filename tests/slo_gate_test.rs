//! SLO enforcement: cost breaches fail the workflow hard.

mod common;

use common::{simple_scope_json, Harness, HarnessOptions, ScriptAction};
use hivemind::domain::models::{EventKind, SwarmStatus};
use hivemind::domain::ports::EventRepository;
use hivemind::services::{ProcessOutcome, SloGate, SloInputs};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn cost_breach_fails_workflow_non_retryable() {
    let harness = Harness::new().await;
    harness.inferencer.seed_corpus().await.unwrap();

    // Every completion burns 100k tokens; at $0.01/1k a handful of task
    // executions pushes estimated cost over the $5 ceiling.
    harness.llm.tokens_per_call.store(100_000, Ordering::Relaxed);
    harness.llm.push_rule(
        "Extract a structured project scope",
        ScriptAction::Text(simple_scope_json()),
        u32::MAX,
    );

    let swarm_id = match harness
        .orchestrator
        .process_message("Build a todo list with Next.js for my tasks")
        .await
        .unwrap()
    {
        ProcessOutcome::Started { swarm_id, .. } => swarm_id,
        other => panic!("expected started, got {other:?}"),
    };

    let swarm = harness.wait_for_terminal(swarm_id).await;
    assert_eq!(swarm.status, SwarmStatus::Failed);

    // The computed cost really did exceed the ceiling
    assert!(harness.cost.cost_usd(swarm_id, 0.01) > 5.0);

    // A cost breach event was recorded
    let breaches = harness
        .event_repo
        .by_kind(swarm_id, EventKind::SloBreach)
        .await
        .unwrap();
    assert!(breaches.iter().any(|e| e.data["slo"] == "cost_usd"));

    // The breach record is part of the swarm's persisted output
    let report = swarm.metadata.get("slo_report").expect("slo report persisted");
    let cost_result = report["results"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["slo"] == "cost_usd")
        .unwrap();
    assert_eq!(cost_result["outcome"], "fail_hard");

    assert_eq!(harness.metrics.counter_value("workflows_failed"), 1);
    assert_eq!(harness.metrics.counter_value("workflows_completed"), 0);
}

#[tokio::test]
async fn gate_evaluation_matrix() {
    let harness = Harness::new().await;
    let gate = SloGate::new(
        hivemind::domain::models::config::SloConfig::default(),
        harness.event_repo.clone(),
        Arc::new(hivemind::domain::ports::NullMetricsSink),
    );
    let swarm_id = uuid::Uuid::new_v4();

    // All green
    let report = gate
        .evaluate(
            swarm_id,
            &SloInputs {
                cost_usd: 1.0,
                latency_seconds: 10.0,
                coverage_pct: Some(97.0),
                stack_confidence: Some(0.9),
            },
        )
        .await
        .unwrap();
    assert!(report.all_green());

    // Cost over -> hard fail
    let report = gate
        .evaluate(swarm_id, &SloInputs { cost_usd: 6.0, ..SloInputs::default() })
        .await
        .unwrap();
    assert!(report.hard_breach().is_some());

    // Coverage under -> retryable fail
    let report = gate
        .evaluate(
            swarm_id,
            &SloInputs { cost_usd: 1.0, coverage_pct: Some(80.0), ..SloInputs::default() },
        )
        .await
        .unwrap();
    assert!(report.hard_breach().is_none());
    assert!(report.retryable_breach().is_some());

    // Latency and confidence only warn
    let report = gate
        .evaluate(
            swarm_id,
            &SloInputs {
                cost_usd: 1.0,
                latency_seconds: 10_000.0,
                coverage_pct: Some(97.0),
                stack_confidence: Some(0.1),
            },
        )
        .await
        .unwrap();
    assert!(report.hard_breach().is_none());
    assert!(report.retryable_breach().is_none());
    assert!(!report.all_green());

    // Breach events were appended for each non-pass result
    let events = harness
        .event_repo
        .by_kind(swarm_id, EventKind::SloBreach)
        .await
        .unwrap();
    assert!(events.len() >= 4);
}

#[tokio::test]
async fn workflow_never_completes_over_budget() {
    // Tighter ceiling: even the default tiny token spend breaches it.
    let harness = Harness::with_options(HarnessOptions {
        slo: hivemind::domain::models::config::SloConfig {
            cost_usd: 0.000001,
            ..Default::default()
        },
        ..HarnessOptions::default()
    })
    .await;
    harness.llm.push_rule(
        "Extract a structured project scope",
        ScriptAction::Text(simple_scope_json()),
        u32::MAX,
    );

    let swarm_id = match harness
        .orchestrator
        .process_message("Build a todo list with Next.js for my tasks")
        .await
        .unwrap()
    {
        ProcessOutcome::Started { swarm_id, .. } => swarm_id,
        other => panic!("expected started, got {other:?}"),
    };

    let swarm = harness.wait_for_terminal(swarm_id).await;
    assert_eq!(swarm.status, SwarmStatus::Failed);
}
