//! Ambiguous input produces clarification questions and no swarm.

mod common;

use common::{Harness, ScriptAction};
use hivemind::domain::ports::SwarmRepository;
use hivemind::services::ProcessOutcome;

#[tokio::test]
async fn greeting_yields_clarification_and_no_swarm() {
    let harness = Harness::new().await;
    harness.llm.push_rule(
        "not enough to scope",
        ScriptAction::Text(
            r#"{"questions": ["What do you want to build?",
                              "Who will use it?"]}"#
                .to_string(),
        ),
        u32::MAX,
    );

    let outcome = harness.orchestrator.process_message("hey").await.unwrap();
    match outcome {
        ProcessOutcome::NeedsClarification { questions } => {
            assert!(!questions.is_empty() && questions.len() <= 3);
        }
        other => panic!("expected clarification, got {other:?}"),
    }

    assert!(harness.swarm_repo.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn short_message_yields_clarification() {
    let harness = Harness::new().await;

    let outcome = harness.orchestrator.process_message("make app").await.unwrap();
    match outcome {
        ProcessOutcome::NeedsClarification { questions } => {
            // The LLM default response is not valid question JSON, so the
            // deterministic fallback questions apply.
            assert!((1..=3).contains(&questions.len()));
        }
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[tokio::test]
async fn clarification_questions_survive_llm_outage() {
    let harness = Harness::new().await;
    harness.llm.push_rule(
        "not enough to scope",
        ScriptAction::Unavailable("provider down".to_string()),
        u32::MAX,
    );

    let outcome = harness.orchestrator.process_message("hi").await.unwrap();
    match outcome {
        ProcessOutcome::NeedsClarification { questions } => {
            assert!(!questions.is_empty(), "fallback questions expected");
        }
        other => panic!("expected clarification, got {other:?}"),
    }
}
