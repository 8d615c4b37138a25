//! Append-only audit events.
//!
//! Event records are the source of truth for the self-healing loop and for
//! observability counters. They are never mutated and survive their swarm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of facts the orchestrator records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Retry,
    ConflictResolved,
    LockAcquired,
    LockReleased,
    LockBroken,
    Escalation,
    SloBreach,
    Decision,
    Constraint,
    Learning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::ConflictResolved => "conflict_resolved",
            Self::LockAcquired => "lock_acquired",
            Self::LockReleased => "lock_released",
            Self::LockBroken => "lock_broken",
            Self::Escalation => "escalation",
            Self::SloBreach => "slo_breach",
            Self::Decision => "decision",
            Self::Constraint => "constraint",
            Self::Learning => "learning",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retry" => Some(Self::Retry),
            "conflict_resolved" => Some(Self::ConflictResolved),
            "lock_acquired" => Some(Self::LockAcquired),
            "lock_released" => Some(Self::LockReleased),
            "lock_broken" => Some(Self::LockBroken),
            "escalation" => Some(Self::Escalation),
            "slo_breach" => Some(Self::SloBreach),
            "decision" => Some(Self::Decision),
            "constraint" => Some(Self::Constraint),
            "learning" => Some(Self::Learning),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub id: Uuid,
    /// Total append order, assigned by the store
    #[serde(default)]
    pub seq: i64,
    pub swarm_id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl SwarmEvent {
    pub fn new(swarm_id: Uuid, kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq: 0,
            swarm_id,
            kind,
            timestamp: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EventKind::Retry,
            EventKind::ConflictResolved,
            EventKind::LockAcquired,
            EventKind::LockReleased,
            EventKind::LockBroken,
            EventKind::Escalation,
            EventKind::SloBreach,
            EventKind::Decision,
            EventKind::Constraint,
            EventKind::Learning,
        ] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_event_serializes_kind_snake_case() {
        let e = SwarmEvent::new(
            Uuid::new_v4(),
            EventKind::ConflictResolved,
            serde_json::json!({"similarity": 0.91}),
        );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "conflict_resolved");
    }
}
