//! Agent domain model.
//!
//! Agents are role-scoped workers owned by a swarm. Adding a role means
//! adding a variant here plus its capability implementation; roles are never
//! wired up through runtime strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskId};

/// Specialized worker roles. The first three are the base trio every plan
/// gets; the rest are allocated by the adaptive planner as complexity grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    FrontendArchitect,
    BackendIntegrator,
    DeploymentGuardian,
    QaSentinel,
    ApiDesigner,
    DataModeler,
    IntegrationSpecialist,
    PerformanceTuner,
    SecurityAuditor,
    DocsScribe,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontendArchitect => "frontend_architect",
            Self::BackendIntegrator => "backend_integrator",
            Self::DeploymentGuardian => "deployment_guardian",
            Self::QaSentinel => "qa_sentinel",
            Self::ApiDesigner => "api_designer",
            Self::DataModeler => "data_modeler",
            Self::IntegrationSpecialist => "integration_specialist",
            Self::PerformanceTuner => "performance_tuner",
            Self::SecurityAuditor => "security_auditor",
            Self::DocsScribe => "docs_scribe",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "frontend_architect" => Some(Self::FrontendArchitect),
            "backend_integrator" => Some(Self::BackendIntegrator),
            "deployment_guardian" => Some(Self::DeploymentGuardian),
            "qa_sentinel" => Some(Self::QaSentinel),
            "api_designer" => Some(Self::ApiDesigner),
            "data_modeler" => Some(Self::DataModeler),
            "integration_specialist" => Some(Self::IntegrationSpecialist),
            "performance_tuner" => Some(Self::PerformanceTuner),
            "security_auditor" => Some(Self::SecurityAuditor),
            "docs_scribe" => Some(Self::DocsScribe),
            _ => None,
        }
    }

    /// Allocation order for adaptive plans: index 0..n of this slice are the
    /// roles a plan with n agents receives.
    pub fn allocation_order() -> &'static [AgentRole] {
        &[
            Self::FrontendArchitect,
            Self::BackendIntegrator,
            Self::DeploymentGuardian,
            Self::QaSentinel,
            Self::ApiDesigner,
            Self::DataModeler,
            Self::IntegrationSpecialist,
            Self::PerformanceTuner,
            Self::SecurityAuditor,
            Self::DocsScribe,
        ]
    }

    /// System prompt preamble for this role's LLM invocations.
    pub fn prompt_preamble(&self) -> &'static str {
        match self {
            Self::FrontendArchitect => {
                "You are a senior frontend architect. Produce component trees, \
                 routing, and state management for the requested feature. \
                 Output a JSON artifact describing files and their contents."
            }
            Self::BackendIntegrator => {
                "You are a backend integrator. Design endpoints, data access, \
                 and service wiring. Output a JSON artifact describing \
                 endpoints, models, and files."
            }
            Self::DeploymentGuardian => {
                "You are a deployment guardian. Produce CI, container, and \
                 environment configuration. Output a JSON artifact describing \
                 deployment files and checks."
            }
            Self::QaSentinel => {
                "You are a QA engineer. Produce test plans and test files, and \
                 report achieved coverage as a number. Output a JSON artifact."
            }
            Self::ApiDesigner => {
                "You are an API designer. Produce an API contract (paths, \
                 verbs, schemas) as a JSON artifact."
            }
            Self::DataModeler => {
                "You are a data modeler. Produce schema definitions and \
                 migrations as a JSON artifact."
            }
            Self::IntegrationSpecialist => {
                "You are an integration specialist. Wire third-party services \
                 and webhooks. Output a JSON artifact."
            }
            Self::PerformanceTuner => {
                "You are a performance engineer. Identify and fix hot paths. \
                 Output a JSON artifact with findings and patches."
            }
            Self::SecurityAuditor => {
                "You are a security auditor. Review for vulnerabilities and \
                 produce remediations as a JSON artifact."
            }
            Self::DocsScribe => {
                "You are a technical writer. Produce README and API docs as a \
                 JSON artifact."
            }
        }
    }

    /// Build the user prompt for executing one task under this role.
    ///
    /// A retried task carries its previous failure in `task.last_error`;
    /// injecting it lets the model regenerate around the error instead of
    /// reproducing it from an identical prompt.
    pub fn build_prompt(&self, task: &Task, scope_summary: &str) -> String {
        let error_context = task
            .last_error
            .as_deref()
            .map(|error| format!("\n\n## Previous attempt failed with\n{error}\nFix the cause of this failure in your output."))
            .unwrap_or_default();

        format!(
            "## Project scope\n{}\n\n## Task {} — {}\n{}{}\n\n\
             Respond with a JSON object: {{\"artifact\": <string or object>, \
             \"coverage_pct\": <number, tests only>, \"notes\": [<string>]}}.\n\
             Output ONLY the JSON object, no other text.",
            scope_summary, task.id, task.title, task.description, error_context
        )
    }

    /// Tools this role is permitted to invoke through the tool registry.
    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            Self::FrontendArchitect => &["file_writer", "code_generator", "browser"],
            Self::BackendIntegrator => &["file_writer", "code_generator"],
            Self::DeploymentGuardian => &["file_writer", "shell"],
            Self::QaSentinel => &["file_writer", "code_generator", "visual_test"],
            Self::ApiDesigner | Self::DataModeler | Self::DocsScribe => &["file_writer"],
            Self::IntegrationSpecialist => &["file_writer", "code_generator", "http_probe"],
            Self::PerformanceTuner => &["file_writer", "code_generator", "profiler"],
            Self::SecurityAuditor => &["file_writer", "code_generator"],
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Failed,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "working" => Some(Self::Working),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Mutable execution state of an agent.
///
/// Invariant: when `current_task_id` is set, the referenced task is
/// `in_progress` and owned by this agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatus,
    pub current_task_id: Option<TaskId>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A role-scoped worker owned by a swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub swarm_id: Uuid,
    pub role: AgentRole,
    pub state: AgentState,
    pub assigned_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(swarm_id: Uuid, role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            swarm_id,
            role,
            state: AgentState::default(),
            assigned_at: Utc::now(),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.state.current_task_id.is_some()
    }

    /// Mark this agent as working the given task.
    pub fn start_task(&mut self, task_id: TaskId) {
        self.state.status = AgentStatus::Working;
        self.state.current_task_id = Some(task_id);
    }

    /// Release the agent back to idle.
    pub fn finish_task(&mut self) {
        self.state.status = AgentStatus::Idle;
        self.state.current_task_id = None;
    }
}

/// Structured output parsed from a role execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// The produced artifact (file map, API contract, etc.)
    pub artifact: serde_json::Value,
    /// Reported test coverage, when the role produces tests
    #[serde(default)]
    pub coverage_pct: Option<f64>,
    /// Free-form observations
    #[serde(default)]
    pub notes: Vec<String>,
}
