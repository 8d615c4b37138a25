//! LLM gateway infrastructure: transport, retry, rate limiting, JSON cleanup.

pub mod error;
pub mod gateway;
pub mod http_client;
pub mod retry;

pub use error::LlmApiError;
pub use gateway::LlmGateway;
pub use http_client::{LlmHttpConfig, OpenRouterClient};
pub use retry::RetryPolicy;

/// Extract a JSON payload from a model response (handles markdown fences
/// and surrounding prose).
pub fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    // ```json ... ``` blocks
    if trimmed.starts_with("```json") {
        if let Some(end) = trimmed.rfind("```") {
            if end > 7 {
                return trimmed[7..end].trim().to_string();
            }
        }
    }

    // ``` ... ``` blocks
    if trimmed.starts_with("```") {
        if let Some(end) = trimmed.rfind("```") {
            let start = if trimmed.starts_with("```\n") { 4 } else { 3 };
            if end > start {
                return trimmed[start..end].trim().to_string();
            }
        }
    }

    // Already a bare object
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    // An object embedded in prose
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}
