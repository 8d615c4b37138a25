//! Hivemind - autonomous multi-agent orchestrator.
//!
//! Turns a natural-language project request into a coordinated swarm of
//! role-scoped agents:
//! - Scope extraction with clarification guard
//! - Nearest-neighbor stack inference over seeded templates
//! - Adaptive planning (complexity-bucketed agent/task shapes)
//! - Durable, checkpointed workflow execution with parallel fan-out
//! - File-lock conflict resolution and UI/API mediation
//! - SLO gating (cost, latency, coverage, confidence)
//! - Self-healing background monitor

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainResult, OrchestratorError};
pub use domain::models::Config;
