//! Plan DSL: the structured description of agents, tasks, and dependencies
//! produced by the adaptive planner.

use serde::{Deserialize, Serialize};

use super::agent::AgentRole;
use super::scope::Scope;
use super::task::TaskId;

/// Complexity buckets mapping a scope score to a plan shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBucket {
    Simple,
    Medium,
    Complex,
    Monster,
}

impl ComplexityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Monster => "monster",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            "monster" => Some(Self::Monster),
            _ => None,
        }
    }

    /// Bucket boundaries: simple < 20, medium < 50, complex < 100,
    /// monster at or above 100.
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            Self::Simple
        } else if score < 50.0 {
            Self::Medium
        } else if score < 100.0 {
            Self::Complex
        } else {
            Self::Monster
        }
    }

    /// How many agents this bucket allocates.
    pub fn num_agents(&self) -> u32 {
        match self {
            Self::Simple => 2,
            Self::Medium => 3,
            Self::Complex => 5,
            // Scaled further by score inside the planner, capped at 10
            Self::Monster => 8,
        }
    }

    /// Whether delivery is split into MVP -> Enhanced -> Polish phases.
    pub fn is_phased(&self) -> bool {
        matches!(self, Self::Monster)
    }
}

impl std::fmt::Display for ComplexityBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Weighted complexity score over the scope's size estimates.
///
/// `2·features + 3·integrations + 1·pages + 2·models + 1.5·endpoints`
pub fn complexity_score(scope: &Scope) -> f64 {
    let e = &scope.estimates;
    2.0 * scope.features.len() as f64
        + 3.0 * f64::from(e.integrations)
        + 1.0 * f64::from(e.pages)
        + 2.0 * f64::from(e.models)
        + 1.5 * f64::from(e.endpoints)
}

/// Delivery phase for monster plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Mvp,
    Enhanced,
    Polish,
}

impl PlanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mvp => "mvp",
            Self::Enhanced => "enhanced",
            Self::Polish => "polish",
        }
    }

    pub fn all() -> &'static [PlanPhase] {
        &[Self::Mvp, Self::Enhanced, Self::Polish]
    }
}

/// A task as declared by the planner, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub dependencies: Vec<TaskId>,
    pub role: AgentRole,
    /// Set for phased plans only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PlanPhase>,
    /// Milestone gates close out a phase
    #[serde(default)]
    pub is_milestone: bool,
}

/// One agent allocation in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAgent {
    /// 1-based index; task ids are `"{index}.{n}"`
    pub index: u32,
    pub role: AgentRole,
}

/// The full plan the workflow engine executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDsl {
    pub complexity: ComplexityBucket,
    pub score: f64,
    pub agents: Vec<PlannedAgent>,
    pub tasks: Vec<PlannedTask>,
}

impl PlanDsl {
    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn num_agents(&self) -> u32 {
        self.agents.len() as u32
    }

    /// Dependency edges as (from, to) pairs; used by the round-trip law
    /// tests and cycle detection.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .map(move |d| (t.id.clone(), d.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::scope::ScopeEstimates;

    fn scope_with(features: usize, estimates: ScopeEstimates) -> Scope {
        Scope {
            features: (0..features).map(|i| format!("feature-{i}")).collect(),
            estimates,
            ..Scope::default()
        }
    }

    #[test]
    fn test_score_formula() {
        let scope = scope_with(
            2,
            ScopeEstimates { integrations: 1, pages: 3, models: 2, endpoints: 4 },
        );
        // 2*2 + 3*1 + 1*3 + 2*2 + 1.5*4 = 20
        assert!((complexity_score(&scope) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(ComplexityBucket::from_score(0.0), ComplexityBucket::Simple);
        assert_eq!(ComplexityBucket::from_score(19.9), ComplexityBucket::Simple);
        assert_eq!(ComplexityBucket::from_score(20.0), ComplexityBucket::Medium);
        assert_eq!(ComplexityBucket::from_score(49.9), ComplexityBucket::Medium);
        assert_eq!(ComplexityBucket::from_score(50.0), ComplexityBucket::Complex);
        assert_eq!(ComplexityBucket::from_score(99.9), ComplexityBucket::Complex);
        assert_eq!(ComplexityBucket::from_score(100.0), ComplexityBucket::Monster);
    }

    #[test]
    fn test_only_monster_is_phased() {
        assert!(!ComplexityBucket::Simple.is_phased());
        assert!(!ComplexityBucket::Medium.is_phased());
        assert!(!ComplexityBucket::Complex.is_phased());
        assert!(ComplexityBucket::Monster.is_phased());
    }

    #[test]
    fn test_edges_enumeration() {
        let plan = PlanDsl {
            complexity: ComplexityBucket::Simple,
            score: 1.0,
            agents: vec![],
            tasks: vec![
                PlannedTask {
                    id: TaskId::new("1.1"),
                    title: "a".into(),
                    description: String::new(),
                    priority: 5,
                    dependencies: vec![],
                    role: AgentRole::FrontendArchitect,
                    phase: None,
                    is_milestone: false,
                },
                PlannedTask {
                    id: TaskId::new("2.1"),
                    title: "b".into(),
                    description: String::new(),
                    priority: 5,
                    dependencies: vec![TaskId::new("1.1")],
                    role: AgentRole::BackendIntegrator,
                    phase: None,
                    is_milestone: false,
                },
            ],
        };
        assert_eq!(plan.edges(), vec![(TaskId::new("2.1"), TaskId::new("1.1"))]);
    }
}
