//! Infrastructure: configuration, LLM gateway, HTTP surface, metrics.

pub mod config;
pub mod http;
pub mod llm;
pub mod logging;
pub mod metrics;
