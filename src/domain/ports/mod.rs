//! Ports: the interfaces the core consumes or exposes.

pub mod llm_client;
pub mod metrics;
pub mod repositories;
pub mod tools;

pub use llm_client::{CompletionRequest, CompletionResponse, LlmClient};
pub use metrics::{MetricsSink, NullMetricsSink};
pub use repositories::{
    AgentRepository, CheckpointRepository, EscalationRepository, EventRepository, SwarmRepository,
    TaskFilter, TaskRepository, TemplateRepository,
};
pub use tools::{ToolCall, ToolContext, ToolHandler, ToolInvoker, ToolRegistry};
