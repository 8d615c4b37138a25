//! Domain models for the Hivemind orchestrator.

pub mod agent;
pub mod config;
pub mod escalation;
pub mod event;
pub mod plan;
pub mod scope;
pub mod swarm;
pub mod task;
pub mod template;

pub use agent::{Agent, AgentOutput, AgentRole, AgentState, AgentStatus};
pub use config::Config;
pub use escalation::{Escalation, EscalationKind, EscalationSeverity, EscalationStatus};
pub use event::{EventKind, SwarmEvent};
pub use plan::{complexity_score, ComplexityBucket, PlanDsl, PlanPhase, PlannedAgent, PlannedTask};
pub use scope::{Scope, ScopeEstimates, ScopeOfWorks, StackInference, TechStack};
pub use swarm::{Swarm, SwarmStatus};
pub use task::{Task, TaskId, TaskStatus};
pub use template::{cosine_similarity, seed_templates, StackTemplate, EMBEDDING_DIM};
