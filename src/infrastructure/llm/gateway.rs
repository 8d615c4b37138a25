//! LLM gateway: retry, rate limiting, JSON handling, token accounting.
//!
//! Every service-layer LLM call goes through here. The gateway owns a
//! token-bucket limiter so provider quotas apply process-wide, retries
//! transient failures with exponential backoff, and strips markdown fences
//! when the caller expects JSON.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::config::GatewayConfig;
use crate::domain::ports::metrics::names;
use crate::domain::ports::{CompletionRequest, CompletionResponse, LlmClient, MetricsSink};

use super::extract_json;
use super::retry::RetryPolicy;

/// Gateway over a pluggable [`LlmClient`].
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    limiter: DefaultDirectRateLimiter,
    metrics: Arc<dyn MetricsSink>,
    tokens_used: AtomicU64,
}

impl LlmGateway {
    pub fn new(
        client: Arc<dyn LlmClient>,
        config: &GatewayConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let period = Duration::from_secs_f64(1.0 / config.requests_per_second.max(0.001));
        let burst = NonZeroU32::new(config.burst_size.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            client,
            retry: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
            limiter: RateLimiter::direct(quota),
            metrics,
            tokens_used: AtomicU64::new(0),
        }
    }

    /// Complete with retry and rate limiting.
    pub async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let response = self
            .retry
            .execute(|| {
                let request = request.clone();
                async move {
                    self.limiter.until_ready().await;
                    self.client.complete(request).await
                }
            })
            .await?;

        self.tokens_used.fetch_add(response.tokens_used, Ordering::Relaxed);
        self.metrics
            .incr_counter(names::TOKENS_USED, response.tokens_used, &[]);

        Ok(response)
    }

    /// Complete and parse the response as JSON of type `T`.
    ///
    /// Markdown fences are stripped before parsing; a parse failure returns
    /// `InvalidJson` with the raw text so callers can self-correct.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
    ) -> DomainResult<(T, CompletionResponse)> {
        let response = self.complete(request).await?;
        let cleaned = extract_json(&response.text);

        let parsed: T = serde_json::from_str(&cleaned)
            .map_err(|e| OrchestratorError::InvalidJson(format!("{e}: {}", response.text)))?;

        Ok((parsed, response))
    }

    /// Embed with retry and rate limiting.
    pub async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        self.retry
            .execute(|| async {
                self.limiter.until_ready().await;
                self.client.embed(text).await
            })
            .await
    }

    /// Total tokens consumed through this gateway since construction.
    pub fn tokens_total(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}
