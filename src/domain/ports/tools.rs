//! Tool invocation port.
//!
//! Agents call external tools (browsers, code generators, file writers)
//! through a typed contract. Handlers are registered by name; unknown names
//! fail with `UnknownTool` rather than being best-effort routed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};

/// A typed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self { name: name.into(), args }
    }
}

/// Execution context handed to a tool handler.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext {
    pub swarm_id: Uuid,
    pub agent_id: Uuid,
}

/// One tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value, ctx: ToolContext)
        -> DomainResult<serde_json::Value>;
}

/// Port through which agent code paths invoke tools.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call(&self, tool: ToolCall, ctx: ToolContext) -> DomainResult<serde_json::Value>;
}

/// Name-keyed handler registry; the default `ToolInvoker`.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn call(&self, tool: ToolCall, ctx: ToolContext) -> DomainResult<serde_json::Value> {
        let handler = self
            .handlers
            .get(&tool.name)
            .ok_or_else(|| OrchestratorError::UnknownTool(tool.name.clone()))?;
        handler.call(tool.args, ctx).await
    }
}
