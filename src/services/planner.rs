//! Adaptive plan generation.
//!
//! Maps scope complexity onto an agent/task shape, wires dependencies
//! (frontend and backend in parallel, deployment after both), and refuses
//! to persist any plan whose dependency graph has a cycle.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    complexity_score, Agent, AgentRole, ComplexityBucket, PlanDsl, PlanPhase, PlannedAgent,
    PlannedTask, Scope, Task, TaskId,
};
use crate::domain::ports::{AgentRepository, TaskRepository};

use super::scheduler::TaskScheduler;

/// Four subtask templates per role: `(title, description)`.
fn role_subtasks(role: AgentRole) -> [(&'static str, &'static str); 4] {
    match role {
        AgentRole::FrontendArchitect => [
            ("Scaffold application shell", "Set up routing, layout, and global state wiring."),
            ("Build core feature screens", "Implement the screens behind the primary features."),
            ("Wire data hooks to the API", "Connect screens to backend endpoints with typed hooks."),
            ("Polish interactions and states", "Loading, empty, and error states; responsive pass."),
        ],
        AgentRole::BackendIntegrator => [
            ("Define data model and migrations", "Design the schema for the core entities."),
            ("Implement CRUD endpoints", "Expose create/read/update/delete for each entity."),
            ("Add auth and validation", "Session handling, input validation, error envelopes."),
            ("Integrate external services", "Wire declared third-party integrations and webhooks."),
        ],
        AgentRole::DeploymentGuardian => [
            ("Author container and env config", "Dockerfile, env templates, secret references."),
            ("Set up CI pipeline", "Build, lint, and test on every push."),
            ("Provision deployment target", "Configure the hosting target and release process."),
            ("Add runtime checks", "Health endpoints, log drains, rollback procedure."),
        ],
        AgentRole::QaSentinel => [
            ("Write unit test suites", "Cover core business logic with unit tests."),
            ("Write integration tests", "Exercise API endpoints against a seeded database."),
            ("Add end-to-end smoke flows", "Script the critical user journeys."),
            ("Report coverage", "Collect and report line coverage for the gate."),
        ],
        AgentRole::ApiDesigner => [
            ("Draft the API contract", "Paths, verbs, request/response schemas."),
            ("Review entity relationships", "Check the contract against the data model."),
            ("Specify error envelopes", "Uniform error shapes and status code mapping."),
            ("Version and document", "Versioning scheme and generated reference docs."),
        ],
        AgentRole::DataModeler => [
            ("Model core entities", "Tables, keys, and constraints for the domain."),
            ("Design indexes", "Index the documented query patterns."),
            ("Write seed data", "Deterministic fixtures for development and tests."),
            ("Plan migrations", "Forward-only migration scripts with rollback notes."),
        ],
        AgentRole::IntegrationSpecialist => [
            ("Inventory third-party services", "Enumerate providers, scopes, and credentials."),
            ("Implement service clients", "Typed clients with retry for each provider."),
            ("Wire webhooks", "Inbound webhook verification and dispatch."),
            ("Add contract tests", "Record/replay tests against provider sandboxes."),
        ],
        AgentRole::PerformanceTuner => [
            ("Baseline key flows", "Measure latency of the critical paths."),
            ("Remove hot-path waste", "Fix N+1 queries and oversized payloads."),
            ("Add caching", "Cache expensive reads with explicit invalidation."),
            ("Load-test and document", "Verify targets under load; record limits."),
        ],
        AgentRole::SecurityAuditor => [
            ("Threat-model the surface", "Enumerate inputs, trust boundaries, secrets."),
            ("Audit authentication paths", "Session fixation, CSRF, token lifetime review."),
            ("Scan dependencies", "Flag vulnerable or unmaintained dependencies."),
            ("Harden configuration", "Headers, TLS, least-privilege service accounts."),
        ],
        AgentRole::DocsScribe => [
            ("Write the README", "Setup, commands, architecture overview."),
            ("Document the API", "Endpoint reference from the contract."),
            ("Write runbooks", "Deploy, rollback, and incident procedures."),
            ("Add onboarding notes", "Project conventions for new contributors."),
        ],
    }
}

/// Builds and persists plans.
pub struct AdaptivePlanner {
    agent_repo: Arc<dyn AgentRepository>,
    task_repo: Arc<dyn TaskRepository>,
}

impl AdaptivePlanner {
    pub fn new(agent_repo: Arc<dyn AgentRepository>, task_repo: Arc<dyn TaskRepository>) -> Self {
        Self { agent_repo, task_repo }
    }

    /// Agents for a bucket; monster scales with score up to 10.
    fn agent_count(bucket: ComplexityBucket, score: f64) -> u32 {
        match bucket {
            ComplexityBucket::Monster => {
                let extra = ((score - 100.0) / 75.0).floor().max(0.0) as u32;
                (8 + extra).min(10)
            }
            other => other.num_agents(),
        }
    }

    /// Build the plan DSL for a scope. Pure; persistence is separate.
    pub fn build_plan(scope: &Scope) -> PlanDsl {
        let score = complexity_score(scope);
        let bucket = ComplexityBucket::from_score(score);
        let num_agents = Self::agent_count(bucket, score);

        let agents: Vec<PlannedAgent> = AgentRole::allocation_order()
            .iter()
            .take(num_agents as usize)
            .enumerate()
            .map(|(i, role)| PlannedAgent { index: i as u32 + 1, role: *role })
            .collect();

        let mut tasks = Vec::new();
        match bucket {
            ComplexityBucket::Simple | ComplexityBucket::Medium => {
                for agent in &agents {
                    tasks.extend(Self::subtask_chain(agent, None, 1, 5));
                }
                Self::wire_cross_dependencies(&agents, &mut tasks, None);
            }
            ComplexityBucket::Complex => {
                for agent in &agents {
                    let chain = Self::subtask_chain(agent, None, 1, 5);
                    tasks.extend(chain);
                    tasks.push(Self::integration_parent(agent, None));
                }
                Self::wire_cross_dependencies(&agents, &mut tasks, None);
            }
            ComplexityBucket::Monster => {
                for (phase_index, phase) in PlanPhase::all().iter().enumerate() {
                    let priority = match phase {
                        PlanPhase::Mvp => 8,
                        PlanPhase::Enhanced => 5,
                        PlanPhase::Polish => 3,
                    };
                    for agent in &agents {
                        tasks.extend(Self::subtask_chain(
                            agent,
                            Some(*phase),
                            phase_index * 4 + 1,
                            priority,
                        ));
                    }
                    Self::wire_cross_dependencies(&agents, &mut tasks, Some(*phase));

                    // Milestone gate closing out the phase
                    let milestone_id = TaskId::new(format!("m.{}", phase_index + 1));
                    let phase_task_ids: Vec<TaskId> = tasks
                        .iter()
                        .filter(|t| t.phase == Some(*phase) && !t.is_milestone)
                        .map(|t| t.id.clone())
                        .collect();
                    tasks.push(PlannedTask {
                        id: milestone_id.clone(),
                        title: format!("Milestone gate: {}", phase.as_str()),
                        description: format!(
                            "Verify every {} deliverable meets its acceptance criteria \
                             before the next phase begins.",
                            phase.as_str()
                        ),
                        priority: 9,
                        dependencies: phase_task_ids,
                        role: AgentRole::DeploymentGuardian,
                        phase: Some(*phase),
                        is_milestone: true,
                    });

                }
                // Each phase's first subtasks wait behind the previous gate
                Self::wire_phase_gates(&mut tasks);

                // One integration parent per agent, spanning all phases
                for agent in &agents {
                    let sub_ids: Vec<TaskId> = tasks
                        .iter()
                        .filter(|t| !t.is_milestone)
                        .filter(|t| t.id.0.starts_with(&format!("{}.", agent.index)))
                        .map(|t| t.id.clone())
                        .collect();
                    let mut parent = Self::integration_parent(agent, None);
                    parent.dependencies = sub_ids;
                    tasks.push(parent);
                }
            }
        }

        PlanDsl { complexity: bucket, score, agents, tasks }
    }

    /// A sequential chain of this role's four subtasks, numbered from
    /// `start` ("2.5" is agent 2's fifth subtask).
    fn subtask_chain(
        agent: &PlannedAgent,
        phase: Option<PlanPhase>,
        start: usize,
        priority: u8,
    ) -> Vec<PlannedTask> {
        let templates = role_subtasks(agent.role);
        let parent = TaskId::new(agent.index.to_string());

        templates
            .iter()
            .enumerate()
            .map(|(offset, (title, description))| {
                let n = start + offset;
                let id = parent.child(n);
                let dependencies = if offset == 0 {
                    Vec::new()
                } else {
                    vec![parent.child(n - 1)]
                };
                PlannedTask {
                    id,
                    title: (*title).to_string(),
                    description: (*description).to_string(),
                    priority,
                    dependencies,
                    role: agent.role,
                    phase,
                    is_milestone: false,
                }
            })
            .collect()
    }

    /// The per-agent integration task used by complex plans; depends on the
    /// agent's four subtasks.
    fn integration_parent(agent: &PlannedAgent, phase: Option<PlanPhase>) -> PlannedTask {
        let parent = TaskId::new(agent.index.to_string());
        PlannedTask {
            id: parent.clone(),
            title: format!("Integrate {} deliverables", agent.role.as_str()),
            description: "Reconcile this role's outputs with the rest of the swarm and \
                          verify acceptance criteria."
                .to_string(),
            priority: 6,
            dependencies: (1..=4).map(|n| parent.child(n)).collect(),
            role: agent.role,
            phase,
            is_milestone: false,
        }
    }

    /// Frontend and backend run in parallel; deployment (and QA, when
    /// present) waits for both sides' final subtask.
    fn wire_cross_dependencies(
        agents: &[PlannedAgent],
        tasks: &mut [PlannedTask],
        phase: Option<PlanPhase>,
    ) {
        fn ordinal(id: &TaskId) -> usize {
            id.0.rsplit('.')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0)
        }

        fn agent_subtasks<'a>(
            tasks: &'a [PlannedTask],
            agent_index: u32,
            phase: Option<PlanPhase>,
        ) -> impl Iterator<Item = &'a PlannedTask> + 'a {
            let prefix = format!("{agent_index}.");
            tasks
                .iter()
                .filter(move |t| !t.is_milestone && t.phase == phase && t.id.0.starts_with(&prefix))
        }

        let find_index =
            |role: AgentRole| agents.iter().find(|a| a.role == role).map(|a| a.index);
        let Some(frontend) = find_index(AgentRole::FrontendArchitect) else { return };
        let Some(backend) = find_index(AgentRole::BackendIntegrator) else { return };

        let upstream: Vec<TaskId> = [frontend, backend]
            .into_iter()
            .filter_map(|index| {
                agent_subtasks(tasks, index, phase)
                    .max_by_key(|t| ordinal(&t.id))
                    .map(|t| t.id.clone())
            })
            .collect();

        for role in [AgentRole::DeploymentGuardian, AgentRole::QaSentinel] {
            let Some(index) = find_index(role) else { continue };
            let first = agent_subtasks(tasks, index, phase)
                .min_by_key(|t| ordinal(&t.id))
                .map(|t| t.id.clone());
            let Some(first) = first else { continue };
            if let Some(task) = tasks.iter_mut().find(|t| t.id == first) {
                for dep in &upstream {
                    if !task.dependencies.contains(dep) {
                        task.dependencies.push(dep.clone());
                    }
                }
            }
        }
    }

    /// Each phase's first subtasks wait on the previous phase's milestone.
    fn wire_phase_gates(tasks: &mut [PlannedTask]) {
        for (phase_index, phase) in PlanPhase::all().iter().enumerate().skip(1) {
            let gate = TaskId::new(format!("m.{phase_index}"));
            let first_n = (phase_index - 1) * 4 + 4 + 1; // first subtask number of this phase
            for task in tasks.iter_mut() {
                if task.phase == Some(*phase) && !task.is_milestone {
                    let is_phase_head =
                        task.id.0.ends_with(&format!(".{first_n}"));
                    if is_phase_head && !task.dependencies.contains(&gate) {
                        task.dependencies.push(gate.clone());
                    }
                }
            }
        }
    }

    /// Convert planned tasks to domain tasks for a swarm.
    fn materialize(swarm_id: Uuid, plan: &PlanDsl, agent_ids: &[(u32, Uuid)]) -> Vec<Task> {
        plan.tasks
            .iter()
            .map(|planned| {
                let agent_uuid = planned
                    .id
                    .0
                    .split('.')
                    .next()
                    .and_then(|prefix| prefix.parse::<u32>().ok())
                    .or_else(|| {
                        // Milestones ("m.1") belong to the planned role's agent
                        plan.agents
                            .iter()
                            .find(|a| a.role == planned.role)
                            .map(|a| a.index)
                    })
                    .and_then(|index| {
                        agent_ids.iter().find(|(i, _)| *i == index).map(|(_, id)| *id)
                    });

                let mut task = Task::new(
                    planned.id.clone(),
                    swarm_id,
                    planned.title.clone(),
                    planned.description.clone(),
                )
                .with_priority(planned.priority);
                for dep in &planned.dependencies {
                    task = task.with_dependency(dep.clone());
                }
                if let Some(agent_uuid) = agent_uuid {
                    task = task.with_agent(agent_uuid);
                }
                task.data = json!({
                    "role": planned.role.as_str(),
                    "phase": planned.phase.map(|p| p.as_str()),
                    "is_milestone": planned.is_milestone,
                });
                task
            })
            .collect()
    }

    /// Persist a plan: create agents and tasks. Aborts with `InvalidPlan`
    /// before writing anything if the dependency graph has a cycle.
    pub async fn persist(
        &self,
        swarm_id: Uuid,
        plan: &PlanDsl,
    ) -> DomainResult<Vec<Agent>> {
        let agent_rows: Vec<(u32, Agent)> = plan
            .agents
            .iter()
            .map(|pa| (pa.index, Agent::new(swarm_id, pa.role)))
            .collect();
        let agent_ids: Vec<(u32, Uuid)> =
            agent_rows.iter().map(|(i, a)| (*i, a.id)).collect();

        let tasks = Self::materialize(swarm_id, plan, &agent_ids);

        if let Some(cycle) = TaskScheduler::detect_cycle(&tasks) {
            let cycle_str = cycle
                .iter()
                .map(TaskId::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(OrchestratorError::InvalidPlan(format!(
                "dependency cycle: {cycle_str}"
            )));
        }

        for (_, agent) in &agent_rows {
            self.agent_repo.create(agent).await?;
        }
        for task in &tasks {
            self.task_repo.create(task).await?;
        }

        tracing::info!(
            %swarm_id,
            complexity = plan.complexity.as_str(),
            agents = plan.agents.len(),
            tasks = tasks.len(),
            "Plan persisted"
        );

        Ok(agent_rows.into_iter().map(|(_, a)| a).collect())
    }
}
