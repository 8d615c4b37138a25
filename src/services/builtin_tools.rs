//! Built-in tool handlers.
//!
//! Real tool endpoints (browsers, screenshot runners) live outside the
//! core; these defaults keep a deployment functional until they are wired
//! in. All handlers are deterministic over their inputs.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{ToolContext, ToolHandler, ToolRegistry};

/// Static checks over the UI plan standing in for a real visual runner:
/// a plan that declares responsiveness and the expected WCAG target passes
/// with a zero diff; anything else reports violations.
pub struct VisualTestHandler;

#[async_trait]
impl ToolHandler for VisualTestHandler {
    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: ToolContext,
    ) -> DomainResult<serde_json::Value> {
        let constraints = &args["ui_plan"]["constraints"];
        let responsive = constraints["responsive"].as_bool().unwrap_or(false);
        let wcag_ok = constraints["wcag"].as_str() == Some("2.1");
        let has_components = args["ui_plan"]["components"]
            .as_array()
            .is_some_and(|c| !c.is_empty());

        let mut violations = 0u64;
        if !responsive {
            violations += 1;
        }
        if !wcag_ok {
            violations += 1;
        }

        Ok(json!({
            "diff_score": if has_components { 0.0 } else { 0.1 },
            "wcag_violations": violations,
        }))
    }
}

/// Register the default handlers on a registry.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register("visual_test", std::sync::Arc::new(VisualTestHandler));
}
