//! Technology-stack inference by nearest-neighbor template lookup.
//!
//! Embeds the scope text, checks the seeded template corpus, and only falls
//! back to a constrained LLM call when no template is close enough. An
//! embedding failure degrades to a conservative default; this stage never
//! halts the pipeline.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::errors::DomainResult;
use crate::domain::models::{seed_templates, StackInference};
use crate::domain::ports::metrics::names;
use crate::domain::ports::{CompletionRequest, MetricsSink, TemplateRepository};
use crate::infrastructure::llm::LlmGateway;

#[derive(Debug, Deserialize)]
struct LlmStackGuess {
    backend: String,
    frontend: String,
    database: String,
    #[serde(default)]
    confidence: f64,
}

/// Nearest-neighbor stack inferencer with LLM fallback.
pub struct StackInferencer {
    gateway: Arc<LlmGateway>,
    templates: Arc<dyn TemplateRepository>,
    metrics: Arc<dyn MetricsSink>,
    /// Accept the top template at or above this cosine similarity
    similarity_threshold: f64,
}

impl StackInferencer {
    pub fn new(
        gateway: Arc<LlmGateway>,
        templates: Arc<dyn TemplateRepository>,
        metrics: Arc<dyn MetricsSink>,
        similarity_threshold: f64,
    ) -> Self {
        Self { gateway, templates, metrics, similarity_threshold }
    }

    /// Seed the template corpus, embedding descriptions that lack vectors.
    /// Idempotent; safe to run at every startup.
    pub async fn seed_corpus(&self) -> DomainResult<()> {
        let existing = self.templates.list().await?;

        for mut template in seed_templates() {
            let already = existing.iter().find(|t| t.title == template.title);
            if already.is_some_and(|t| t.embedding.is_some()) {
                continue;
            }
            match self.gateway.embed(&template.description).await {
                Ok(vector) => template.embedding = Some(vector),
                Err(e) => {
                    tracing::warn!(title = %template.title, error = %e,
                        "Seeding template without embedding");
                }
            }
            self.templates.upsert(&template).await?;
        }
        Ok(())
    }

    /// Infer a stack for the given scope text.
    pub async fn infer(&self, scope_text: &str) -> DomainResult<StackInference> {
        let embedding = match self.gateway.embed(scope_text).await {
            Ok(v) => v,
            Err(e) => {
                // The pipeline never halts here; degrade to the default.
                tracing::warn!(error = %e, "Embedding failed, using conservative default");
                let inference = StackInference::conservative_default();
                self.record(&inference, 0.0);
                return Ok(inference);
            }
        };

        let nearest = self.templates.nearest(&embedding, 1).await?;
        if let Some((template, similarity)) = nearest.into_iter().next() {
            if similarity >= self.similarity_threshold {
                let inference = StackInference {
                    backend: template.backend,
                    frontend: template.frontend,
                    database: template.database,
                    confidence: similarity,
                    template_title: Some(template.title),
                    fallback: false,
                };
                self.record(&inference, similarity);
                return Ok(inference);
            }
            tracing::debug!(similarity, threshold = self.similarity_threshold,
                "Best template below threshold, falling back to LLM");
        }

        self.llm_fallback(scope_text).await
    }

    async fn llm_fallback(&self, scope_text: &str) -> DomainResult<StackInference> {
        let request = CompletionRequest::new(format!(
            "Choose a technology stack for this project:\n\n{scope_text}\n\n\
             Return JSON with keys backend, frontend, database, confidence \
             (confidence is your certainty in [0,1]). Output ONLY the JSON object."
        ))
        .with_system("You select pragmatic, boring technology stacks.")
        .with_temperature(0.0);

        match self.gateway.complete_json::<LlmStackGuess>(request).await {
            Ok((guess, _)) => {
                let inference = StackInference {
                    backend: guess.backend,
                    frontend: guess.frontend,
                    database: guess.database,
                    confidence: guess.confidence.clamp(0.0, 1.0),
                    template_title: None,
                    fallback: true,
                };
                self.record(&inference, 0.0);
                Ok(inference)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM stack fallback failed, using default");
                let inference = StackInference::conservative_default();
                self.record(&inference, 0.0);
                Ok(inference)
            }
        }
    }

    fn record(&self, inference: &StackInference, similarity: f64) {
        tracing::info!(
            similarity,
            fallback = inference.fallback,
            confidence = inference.confidence,
            "stack_inference.infer"
        );
        self.metrics
            .observe_histogram(names::STACK_CONFIDENCE, inference.confidence);
    }
}
