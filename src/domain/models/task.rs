//! Task domain model.
//!
//! Tasks are the atomic units of work agents execute. Within a swarm they
//! form a DAG through their dependency lists. Ids are hierarchy-encoded
//! strings ("2.3" is the third subtask of agent 2's template), stable across
//! restarts and unique within their swarm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hierarchy-encoded task identifier, unique within a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compose a child id under a parent ("2" + 3 -> "2.3").
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}.{}", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Defined; waiting for dependencies and an agent slot
    Pending,
    /// Currently being executed by exactly one agent
    InProgress,
    /// Finished successfully
    Completed,
    /// Execution failed
    Failed,
    /// A dependency failed permanently
    Blocked,
    /// Abandoned due to swarm cancellation
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Valid transitions from this status.
    ///
    /// `Failed -> Pending` is reserved for the retry manager; `Blocked ->
    /// Pending` is reserved for the monitor after escalation resolution.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Blocked, Self::Skipped],
            Self::InProgress => &[Self::Completed, Self::Failed, Self::Skipped],
            Self::Failed => &[Self::Pending, Self::Blocked, Self::Skipped],
            Self::Blocked => &[Self::Pending, Self::Skipped],
            Self::Completed | Self::Skipped => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A discrete unit of work dispatchable to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Hierarchy-encoded identifier, unique within the swarm
    pub id: TaskId,
    /// Owning swarm
    pub swarm_id: Uuid,
    /// Assigned agent, if any
    pub agent_id: Option<Uuid>,
    /// Human-readable title
    pub title: String,
    /// Detailed description/prompt
    pub description: String,
    /// Priority in [1..10], higher is more urgent
    pub priority: u8,
    /// Current status
    pub status: TaskStatus,
    /// Ids of tasks this one depends on
    pub dependencies: Vec<TaskId>,
    /// Inputs and outputs (artifacts, reported coverage, tool results)
    pub data: serde_json::Value,
    /// How many executions have been attempted
    pub attempts: u32,
    /// Maximum attempts before the retry manager gives up
    pub max_attempts: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the most recent failure happened (drives retry backoff)
    pub failed_at: Option<DateTime<Utc>>,
    /// Version for optimistic locking
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        swarm_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            swarm_id,
            agent_id: None,
            title: title.into(),
            description: description.into(),
            priority: 5,
            status: TaskStatus::default(),
            dependencies: Vec::new(),
            data: serde_json::json!({}),
            attempts: 0,
            max_attempts: 5,
            last_error: None,
            failed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set priority, clamped to [1..10].
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Add a dependency. Self-dependencies and duplicates are ignored.
    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        let dep = dep.into();
        if dep != self.id && !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Assign an owning agent.
    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, maintaining timestamps and version.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
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

        match new_status {
            TaskStatus::InProgress => {
                self.started_at = Some(Utc::now());
                self.attempts += 1;
            }
            TaskStatus::Completed | TaskStatus::Skipped => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Failed => {
                self.failed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Record a failure with its error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), String> {
        self.last_error = Some(error.into());
        self.transition_to(TaskStatus::Failed)
    }

    /// Bump version and timestamp after a non-status mutation. Persisting
    /// through `TaskRepository::update` requires this (or `transition_to`)
    /// so the optimistic-concurrency guard lines up.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the retry manager may send this task back to pending.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.attempts < self.max_attempts
    }

    /// Reset to pending for a retry. Attempts stay monotone; they are
    /// incremented on the next transition to `InProgress`.
    pub fn retry(&mut self) -> Result<(), String> {
        if !self.can_retry() {
            return Err("Cannot retry: either not failed or max attempts reached".to_string());
        }
        self.transition_to(TaskStatus::Pending)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().is_empty() {
            return Err("Task id cannot be empty".to_string());
        }
        if self.title.is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if !(1..=10).contains(&self.priority) {
            return Err(format!("Priority {} outside [1..10]", self.priority));
        }
        if self.dependencies.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        Ok(())
    }
}
