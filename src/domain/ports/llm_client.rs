//! LLM client port.
//!
//! The transport (provider HTTP, CLI shells, test doubles) lives behind this
//! trait. Retry, rate limiting, and JSON handling are the gateway's job, not
//! the client's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// A typed completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User message
    pub user: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token cap
    pub max_tokens: u32,
    /// Provider reasoning effort: low | medium | high
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Whether to request a streamed response
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.3,
            max_tokens: 4096,
            reasoning_effort: None,
            stream: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }
}

/// A completion response with token accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub tokens_used: u64,
    pub model: String,
}

/// Port interface for language-model completion and embedding.
///
/// Implementations surface rate limits as
/// [`OrchestratorError::RateLimited`](crate::domain::errors::OrchestratorError)
/// and transport failures as `LlmUnavailable` so the gateway can classify.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one completion request.
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse>;

    /// Embed a text into a 1536-dimensional vector.
    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>>;
}
