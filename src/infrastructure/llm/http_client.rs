//! OpenAI-compatible chat/embeddings client.
//!
//! Works against OpenRouter or any provider speaking the same wire format.
//! This is transport only; retry and rate limiting live in the gateway.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::EMBEDDING_DIM;
use crate::domain::ports::{CompletionRequest, CompletionResponse, LlmClient};

use super::error::LlmApiError;

/// Configuration for the provider transport.
#[derive(Debug, Clone)]
pub struct LlmHttpConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout_secs: 120,
        }
    }
}

/// OpenAI-compatible HTTP client.
pub struct OpenRouterClient {
    http: reqwest::Client,
    config: LlmHttpConfig,
}

impl OpenRouterClient {
    pub fn new(config: LlmHttpConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, LlmApiError> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(LlmApiError::from_status(status, body, retry_after));
        }

        response
            .json()
            .await
            .map_err(|e| LlmApiError::UnknownError(StatusCode::OK, e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": request.stream,
        });
        if let Some(effort) = &request.reasoning_effort {
            body["reasoning"] = json!({"effort": effort});
        }

        let result = self.post_json("/chat/completions", body).await.map_err(
            OrchestratorError::from,
        )?;

        let text = result["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                OrchestratorError::LlmUnavailable("response had no text content".to_string())
            })?;

        let tokens_used = result["usage"]["total_tokens"].as_u64().unwrap_or(0);
        let model = result["model"]
            .as_str()
            .unwrap_or(&self.config.model)
            .to_string();

        Ok(CompletionResponse { text, tokens_used, model })
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        let body = json!({
            "model": self.config.embedding_model,
            "input": text,
        });

        let result = self
            .post_json("/embeddings", body)
            .await
            .map_err(OrchestratorError::from)?;

        let vector: Vec<f32> = result["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| {
                OrchestratorError::LlmUnavailable("embedding response had no vector".to_string())
            })?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != EMBEDDING_DIM {
            tracing::warn!(
                got = vector.len(),
                expected = EMBEDDING_DIM,
                "Embedding dimension mismatch"
            );
        }

        Ok(vector)
    }
}
