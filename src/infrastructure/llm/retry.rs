//! Retry policy with exponential backoff for gateway requests.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::errors::OrchestratorError;

/// Exponential backoff: `initial * 2^attempt`, capped at `max_backoff_ms`.
///
/// Retries transient failures only (network, 5xx, rate limits). A rate
/// limit's `retry_after` overrides the computed backoff when longer.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self { max_retries, initial_backoff_ms, max_backoff_ms }
    }

    /// Execute an async operation with retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OrchestratorError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }

                    let mut backoff = self.calculate_backoff(attempt);
                    if let OrchestratorError::RateLimited { retry_after_secs } = &err {
                        backoff = backoff.max(Duration::from_secs(*retry_after_secs));
                    }

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying gateway request"
                    );

                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_calculate_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(2_000));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(4_000));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(8_000));
        assert_eq!(policy.calculate_backoff(5), Duration::from_millis(60_000));
        assert_eq!(policy.calculate_backoff(9), Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let policy = RetryPolicy::new(3, 1, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(OrchestratorError::LlmUnavailable("503".to_string()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(3, 1, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OrchestratorError::InvalidJson("nope".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let policy = RetryPolicy::new(2, 1, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OrchestratorError::RateLimited { retry_after_secs: 0 })
                }
            })
            .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
