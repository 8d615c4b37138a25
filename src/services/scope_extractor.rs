//! Scope extraction from free-text requests.
//!
//! Too-short or greeting-only messages come back as clarification requests;
//! everything else goes through a fixed-schema LLM extraction with one
//! self-correction attempt before `ExtractionFailed`.

use std::sync::Arc;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::Scope;
use crate::domain::ports::CompletionRequest;
use crate::infrastructure::llm::LlmGateway;

use super::stack_inference::StackInferencer;

/// Minimum whitespace-separated tokens before extraction is attempted.
const MIN_TOKENS: usize = 5;

/// Messages matching these openers are treated as greetings.
const GREETINGS: &[&str] = &[
    "hi", "hey", "hello", "yo", "sup", "howdy", "hola", "good morning", "good evening",
    "what's up", "whats up",
];

/// Fallback questions when the LLM cannot be reached for question
/// generation. The extraction guard path must never hard-fail.
const DEFAULT_QUESTIONS: &[&str] = &[
    "What are you trying to build, in a sentence or two?",
    "Who is it for, and what is the single most important feature?",
    "Any technology preferences or constraints?",
];

/// Outcome of an extraction attempt.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// A structured scope ready for planning
    Scope(Box<Scope>),
    /// The request is too vague; ask these first
    NeedsClarification(Vec<String>),
}

/// Turns user messages into structured scopes.
pub struct ScopeExtractor {
    gateway: Arc<LlmGateway>,
    inferencer: Arc<StackInferencer>,
}

impl ScopeExtractor {
    pub fn new(gateway: Arc<LlmGateway>, inferencer: Arc<StackInferencer>) -> Self {
        Self { gateway, inferencer }
    }

    /// Whether a message is too vague to plan from: under five tokens, or
    /// a greeting opener with too little behind it to carry a request.
    pub fn needs_clarification(message: &str) -> bool {
        let trimmed = message.trim().to_lowercase();
        let tokens = trimmed.split_whitespace().count();
        if tokens < MIN_TOKENS {
            return true;
        }
        let opens_with_greeting = GREETINGS
            .iter()
            .any(|g| trimmed == *g || trimmed.starts_with(&format!("{g} ")) || trimmed.starts_with(&format!("{g},")));
        opens_with_greeting && tokens < 10
    }

    /// Extract a scope, or produce up to three clarification questions.
    pub async fn extract(&self, user_message: &str) -> DomainResult<ExtractionOutcome> {
        if Self::needs_clarification(user_message) {
            let questions = self.clarification_questions(user_message).await;
            return Ok(ExtractionOutcome::NeedsClarification(questions));
        }

        let mut scope = self.extract_scope(user_message).await?;

        scope
            .estimates
            .backfill_from_features(scope.features.len() as u32);

        // Stack inference runs on the extracted goal; it degrades rather
        // than fails, so the outcome is always attached.
        let inference = self.inferencer.infer(&scope.goal).await?;
        scope.stack_inference = Some(inference);

        Ok(ExtractionOutcome::Scope(Box::new(scope)))
    }

    async fn extract_scope(&self, user_message: &str) -> DomainResult<Scope> {
        let request = self.build_extraction_request(user_message);

        match self.gateway.complete_json::<Scope>(request).await {
            Ok((scope, _)) => Ok(scope),
            Err(OrchestratorError::InvalidJson(raw)) => {
                // One self-correction attempt with the broken output quoted.
                tracing::warn!("Extraction returned invalid JSON, attempting self-correction");
                let retry = CompletionRequest::new(format!(
                    "Your previous output could not be parsed as JSON:\n\n{raw}\n\n\
                     Re-emit the scope for this request as VALID JSON only, matching the \
                     schema exactly:\n\n{user_message}"
                ))
                .with_system(EXTRACTION_SYSTEM)
                .with_temperature(0.0);

                self.gateway
                    .complete_json::<Scope>(retry)
                    .await
                    .map(|(scope, _)| scope)
                    .map_err(|e| OrchestratorError::ExtractionFailed(e.to_string()))
            }
            Err(other) => Err(other),
        }
    }

    fn build_extraction_request(&self, user_message: &str) -> CompletionRequest {
        CompletionRequest::new(format!(
            "Extract a structured project scope from this request:\n\n{user_message}\n\n\
             Respond with a JSON object:\n\
             {{\n\
               \"project_name\": \"short name\",\n\
               \"goal\": \"one-sentence goal\",\n\
               \"tech_stack\": {{\"frontend\": \"\", \"backend\": \"\", \"database\": \"\", \
                  \"auth\": \"\", \"deployment\": \"\"}},\n\
               \"features\": [\"...\"],\n\
               \"competitors\": [\"...\"],\n\
               \"timeline\": \"...\",\n\
               \"scope_of_works\": {{\"in_scope\": [], \"out_scope\": [], \"milestones\": [], \
                  \"risks\": [], \"kpis\": []}},\n\
               \"estimates\": {{\"integrations\": 0, \"pages\": 0, \"models\": 0, \"endpoints\": 0}}\n\
             }}\n\
             Leave unknown string fields empty. Estimates are counts; guess \
             conservatively. Output ONLY the JSON object."
        ))
        .with_system(EXTRACTION_SYSTEM)
        .with_temperature(0.0)
    }

    async fn clarification_questions(&self, user_message: &str) -> Vec<String> {
        let request = CompletionRequest::new(format!(
            "A user said: \"{user_message}\". That is not enough to scope a software \
             project. Write at most 3 short questions that would let us scope it. \
             Respond with a JSON object: {{\"questions\": [\"...\"]}}. Output ONLY JSON."
        ))
        .with_temperature(0.2);

        #[derive(serde::Deserialize)]
        struct Questions {
            questions: Vec<String>,
        }

        match self.gateway.complete_json::<Questions>(request).await {
            Ok((q, _)) if !q.questions.is_empty() => {
                q.questions.into_iter().take(3).collect()
            }
            _ => DEFAULT_QUESTIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

const EXTRACTION_SYSTEM: &str =
    "You extract structured project scopes from informal software requests. \
     You never invent requirements the user did not imply.";
