//! Escalation domain model.
//!
//! An escalation is a persisted, user-actionable blocker created when
//! automated recovery has exhausted its options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskId;

/// What category of human input is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    Configuration,
    DesignDecision,
    ExternalService,
    UnclearRequirement,
}

impl EscalationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::DesignDecision => "design_decision",
            Self::ExternalService => "external_service",
            Self::UnclearRequirement => "unclear_requirement",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "configuration" => Some(Self::Configuration),
            "design_decision" => Some(Self::DesignDecision),
            "external_service" => Some(Self::ExternalService),
            "unclear_requirement" => Some(Self::UnclearRequirement),
            _ => None,
        }
    }
}

/// Severity of the blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for EscalationSeverity {
    fn default() -> Self {
        Self::Medium
    }
}

impl EscalationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Lifecycle status of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Resolved,
    Cancelled,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A surfaced blocker awaiting human input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub swarm_id: Uuid,
    pub task_id: Option<TaskId>,
    pub agent_id: Option<Uuid>,
    pub kind: EscalationKind,
    pub severity: EscalationSeverity,
    pub description: String,
    pub suggested_actions: Vec<String>,
    /// Whether the rest of the swarm can make progress without resolution
    pub can_continue_without: bool,
    pub status: EscalationStatus,
    /// Payload supplied by the human; accumulates across partial resolutions
    pub resolution: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escalation {
    pub fn new(
        swarm_id: Uuid,
        kind: EscalationKind,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            swarm_id,
            task_id: None,
            agent_id: None,
            kind,
            severity: EscalationSeverity::default(),
            description: description.into(),
            suggested_actions: Vec::new(),
            can_continue_without: false,
            status: EscalationStatus::Pending,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_severity(mut self, severity: EscalationSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggested_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }

    pub fn with_can_continue(mut self, can_continue: bool) -> Self {
        self.can_continue_without = can_continue;
        self
    }

    /// Apply a resolution payload.
    ///
    /// Partial input (missing `complete: true`) merges into the accumulated
    /// resolution and leaves the escalation pending; a payload carrying
    /// `complete: true` finalizes it.
    pub fn apply_resolution(&mut self, payload: serde_json::Value) -> Result<(), String> {
        if self.status != EscalationStatus::Pending {
            return Err(format!(
                "Escalation is {} and cannot accept input",
                self.status.as_str()
            ));
        }

        let complete = payload
            .get("complete")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);

        let mergeable = payload.is_object()
            && matches!(self.resolution, Some(serde_json::Value::Object(_)));
        if mergeable {
            if let (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) =
                (self.resolution.as_mut(), payload)
            {
                for (k, v) in incoming {
                    existing.insert(k, v);
                }
            }
        } else {
            self.resolution = Some(payload);
        }

        if complete {
            self.status = EscalationStatus::Resolved;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.status = EscalationStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn escalation() -> Escalation {
        Escalation::new(
            Uuid::new_v4(),
            EscalationKind::Configuration,
            "Missing STRIPE_API_KEY",
        )
    }

    #[test]
    fn test_full_resolution() {
        let mut e = escalation();
        e.apply_resolution(json!({"api_key": "sk_test"})).unwrap();
        assert_eq!(e.status, EscalationStatus::Resolved);
    }

    #[test]
    fn test_partial_resolution_stays_pending_and_merges() {
        let mut e = escalation();
        e.apply_resolution(json!({"api_key": "sk_test", "complete": false}))
            .unwrap();
        assert_eq!(e.status, EscalationStatus::Pending);

        e.apply_resolution(json!({"webhook_secret": "whsec", "complete": true}))
            .unwrap();
        assert_eq!(e.status, EscalationStatus::Resolved);

        let merged = e.resolution.unwrap();
        assert_eq!(merged["api_key"], "sk_test");
        assert_eq!(merged["webhook_secret"], "whsec");
    }

    #[test]
    fn test_resolved_rejects_further_input() {
        let mut e = escalation();
        e.apply_resolution(json!({"done": true})).unwrap();
        assert!(e.apply_resolution(json!({"more": 1})).is_err());
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EscalationKind::Configuration,
            EscalationKind::DesignDecision,
            EscalationKind::ExternalService,
            EscalationKind::UnclearRequirement,
        ] {
            assert_eq!(EscalationKind::from_str(kind.as_str()), Some(kind));
        }
    }
}
