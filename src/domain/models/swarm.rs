//! Swarm domain model.
//!
//! A swarm is the top-level execution unit for one user request. It owns
//! its agents and tasks; exactly one workflow execution drives it at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a swarm over its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    /// Created but no workflow running yet
    Idle,
    /// Workflow execution in progress
    Running,
    /// Execution suspended by operator
    Paused,
    /// Blocked on an outstanding escalation
    AwaitingApproval,
    /// All steps finished and SLOs passed
    Completed,
    /// Unrecoverable failure on the critical path
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl Default for SwarmStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl SwarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    ///
    /// Only the workflow engine and the monitor drive these transitions.
    pub fn valid_transitions(&self) -> &'static [SwarmStatus] {
        match self {
            Self::Idle => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Paused,
                Self::AwaitingApproval,
                Self::Completed,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::AwaitingApproval => &[Self::Running, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// The top-level execution unit for one orchestrated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name, derived from the extracted project name
    pub name: String,
    /// Current status
    pub status: SwarmStatus,
    /// Number of agents the planner allocated
    pub num_agents: u32,
    /// Arbitrary structured payload; holds the full extracted scope
    pub metadata: serde_json::Value,
    /// Version for optimistic locking
    pub version: u64,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Swarm {
    /// Create a new idle swarm.
    pub fn new(name: impl Into<String>, num_agents: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: SwarmStatus::default(),
            num_agents,
            metadata: serde_json::json!({}),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach metadata (builder method).
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn can_transition_to(&self, new_status: SwarmStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: SwarmStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
