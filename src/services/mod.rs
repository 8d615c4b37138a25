//! Orchestration services.

pub mod agent_runner;
pub mod builtin_tools;
pub mod conflict_resolver;
pub mod cost_tracker;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod retry_manager;
pub mod scheduler;
pub mod scope_extractor;
pub mod slo_gate;
pub mod stack_inference;
pub mod workflow;

pub use agent_runner::AgentRunner;
pub use builtin_tools::register_builtin_tools;
pub use conflict_resolver::{ConflictResolver, MediationResult};
pub use cost_tracker::CostTracker;
pub use monitor::{MonitorSettings, MonitorStats, OrchestrationMonitor};
pub use orchestrator::{Orchestrator, ProcessOutcome};
pub use planner::AdaptivePlanner;
pub use retry_manager::{ErrorKind, RetryDecision, RetryManager};
pub use scheduler::{ProgressReport, TaskScheduler};
pub use scope_extractor::{ExtractionOutcome, ScopeExtractor};
pub use slo_gate::{SloGate, SloInputs, SloOutcome, SloReport, SloResult};
pub use stack_inference::StackInferencer;
pub use workflow::{
    UiConstraints, UiPlan, WorkflowEngine, WorkflowEngineConfig, WorkflowOutcome, WorkflowStep,
    WorkflowTimeouts,
};
