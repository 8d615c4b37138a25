//! Conflict resolution: file locks, failure propagation, and UI/API
//! mismatch mediation.
//!
//! The resolver owns its lock map behind a mutex and is constructed once,
//! then shared by the workflow engine and the monitor. Lock changes are
//! mirrored to the event log so a crashed process's locks go stale and get
//! broken by the next holder after the TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{cosine_similarity, EventKind, SwarmEvent, TaskId};
use crate::domain::ports::metrics::names;
use crate::domain::ports::{CompletionRequest, EventRepository, MetricsSink};
use crate::infrastructure::llm::LlmGateway;

#[derive(Debug, Clone)]
struct LockEntry {
    swarm_id: Uuid,
    agent_id: Uuid,
    acquired_at: DateTime<Utc>,
}

/// Outcome of a mediation pass.
#[derive(Debug, Clone)]
pub struct MediationResult {
    pub fixed_artifact: String,
    pub pre_similarity: f64,
    pub post_similarity: f64,
}

/// File-lock registry, dependency-failure tracking, and artifact mediation.
pub struct ConflictResolver {
    locks: Mutex<HashMap<String, LockEntry>>,
    failed_tasks: Mutex<HashSet<(Uuid, TaskId)>>,
    events: Arc<dyn EventRepository>,
    gateway: Arc<LlmGateway>,
    metrics: Arc<dyn MetricsSink>,
    /// Mediate when similarity falls below this
    similarity_threshold: f64,
    /// A lock older than this may be broken
    lock_ttl: Duration,
}

impl ConflictResolver {
    pub fn new(
        events: Arc<dyn EventRepository>,
        gateway: Arc<LlmGateway>,
        metrics: Arc<dyn MetricsSink>,
        similarity_threshold: f64,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            failed_tasks: Mutex::new(HashSet::new()),
            events,
            gateway,
            metrics,
            similarity_threshold,
            lock_ttl,
        }
    }

    fn publish_lock_gauge(&self) {
        let count = self.locks.lock().expect("lock map poisoned").len();
        self.metrics.set_gauge(names::ACTIVE_FILE_LOCKS, count as f64);
    }

    /// Try to claim `filepath` for `agent_id`.
    ///
    /// Succeeds when the path is unheld or already held by the same agent.
    /// A holder past the stale TTL is broken with a `lock_broken` event.
    pub async fn acquire_lock(
        &self,
        swarm_id: Uuid,
        filepath: &str,
        agent_id: Uuid,
    ) -> DomainResult<bool> {
        enum Outcome {
            Acquired,
            Reentrant,
            Broken { previous_holder: Uuid },
            Held,
        }

        let outcome = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            match locks.get(filepath) {
                None => {
                    locks.insert(
                        filepath.to_string(),
                        LockEntry { swarm_id, agent_id, acquired_at: Utc::now() },
                    );
                    Outcome::Acquired
                }
                Some(entry) if entry.agent_id == agent_id => Outcome::Reentrant,
                Some(entry) => {
                    let age = Utc::now().signed_duration_since(entry.acquired_at);
                    if age.num_seconds() >= 0
                        && age.to_std().unwrap_or_default() > self.lock_ttl
                    {
                        let previous_holder = entry.agent_id;
                        locks.insert(
                            filepath.to_string(),
                            LockEntry { swarm_id, agent_id, acquired_at: Utc::now() },
                        );
                        Outcome::Broken { previous_holder }
                    } else {
                        Outcome::Held
                    }
                }
            }
        };

        match outcome {
            Outcome::Acquired => {
                self.events
                    .append(&SwarmEvent::new(
                        swarm_id,
                        EventKind::LockAcquired,
                        json!({"filepath": filepath, "agent_id": agent_id}),
                    ))
                    .await?;
                self.publish_lock_gauge();
                Ok(true)
            }
            Outcome::Reentrant => Ok(true),
            Outcome::Broken { previous_holder } => {
                tracing::warn!(%filepath, %previous_holder, %agent_id, "Breaking stale lock");
                self.events
                    .append(&SwarmEvent::new(
                        swarm_id,
                        EventKind::LockBroken,
                        json!({
                            "filepath": filepath,
                            "previous_holder": previous_holder,
                            "new_holder": agent_id,
                        }),
                    ))
                    .await?;
                self.publish_lock_gauge();
                Ok(true)
            }
            Outcome::Held => Ok(false),
        }
    }

    /// Release `filepath` if held by `agent_id`; no-op otherwise.
    pub async fn release_lock(
        &self,
        swarm_id: Uuid,
        filepath: &str,
        agent_id: Uuid,
    ) -> DomainResult<()> {
        let released = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            match locks.get(filepath) {
                Some(entry) if entry.agent_id == agent_id => {
                    locks.remove(filepath);
                    true
                }
                _ => false,
            }
        };

        if released {
            self.events
                .append(&SwarmEvent::new(
                    swarm_id,
                    EventKind::LockReleased,
                    json!({"filepath": filepath, "agent_id": agent_id}),
                ))
                .await?;
            self.publish_lock_gauge();
        }
        Ok(())
    }

    /// Record a task failure and release every lock its agent holds.
    pub async fn on_task_failed(
        &self,
        swarm_id: Uuid,
        task_id: &TaskId,
        agent_id: Uuid,
    ) -> DomainResult<()> {
        self.failed_tasks
            .lock()
            .expect("failed set poisoned")
            .insert((swarm_id, task_id.clone()));

        let released: Vec<String> = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            let paths: Vec<String> = locks
                .iter()
                .filter(|(_, entry)| entry.agent_id == agent_id)
                .map(|(path, _)| path.clone())
                .collect();
            for path in &paths {
                locks.remove(path);
            }
            paths
        };

        for path in &released {
            self.events
                .append(&SwarmEvent::new(
                    swarm_id,
                    EventKind::LockReleased,
                    json!({"filepath": path, "agent_id": agent_id, "cause": "task_failed"}),
                ))
                .await?;
        }
        self.publish_lock_gauge();
        Ok(())
    }

    /// Forget a task's failure after a successful retry.
    pub fn clear_failed(&self, swarm_id: Uuid, task_id: &TaskId) {
        self.failed_tasks
            .lock()
            .expect("failed set poisoned")
            .remove(&(swarm_id, task_id.clone()));
    }

    /// Release every lock held on behalf of this swarm.
    pub async fn release_all(&self, swarm_id: Uuid) -> DomainResult<()> {
        let released: Vec<(String, Uuid)> = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            let mine: Vec<(String, Uuid)> = locks
                .iter()
                .filter(|(_, entry)| entry.swarm_id == swarm_id)
                .map(|(path, entry)| (path.clone(), entry.agent_id))
                .collect();
            for (path, _) in &mine {
                locks.remove(path);
            }
            mine
        };

        for (path, agent_id) in &released {
            self.events
                .append(&SwarmEvent::new(
                    swarm_id,
                    EventKind::LockReleased,
                    json!({"filepath": path, "agent_id": agent_id, "cause": "cancelled"}),
                ))
                .await?;
        }
        self.publish_lock_gauge();
        Ok(())
    }

    /// Whether any of `dependencies` is in the failed set.
    pub async fn should_block(
        &self,
        swarm_id: Uuid,
        dependencies: &[TaskId],
    ) -> (bool, Option<String>) {
        let failed = self.failed_tasks.lock().expect("failed set poisoned");
        for dep in dependencies {
            if failed.contains(&(swarm_id, dep.clone())) {
                return (true, Some(format!("dependency {dep} failed")));
            }
        }
        (false, None)
    }

    /// Number of currently held locks.
    pub fn active_locks(&self) -> usize {
        self.locks.lock().expect("lock map poisoned").len()
    }

    /// Embed both artifacts and compare. `should_mediate` when similarity
    /// falls below the configured threshold.
    pub async fn detect_conflict(
        &self,
        ui_artifact: &str,
        backend_artifact: &str,
    ) -> DomainResult<(f64, bool)> {
        let ui_vec = self.gateway.embed(ui_artifact).await?;
        let backend_vec = self.gateway.embed(backend_artifact).await?;

        let similarity = cosine_similarity(&ui_vec, &backend_vec);
        let should_mediate = similarity < self.similarity_threshold;

        self.metrics.observe_histogram(names::CONFLICT_SIMILARITY, similarity);
        if should_mediate {
            self.metrics.incr_counter(names::CONFLICTS_DETECTED, 1, &[]);
        }

        tracing::info!(similarity, should_mediate, "Conflict detection");
        Ok((similarity, should_mediate))
    }

    /// Regenerate the UI artifact to align with the backend's contract.
    pub async fn mediate(
        &self,
        swarm_id: Uuid,
        ui_artifact: &str,
        backend_artifact: &str,
        pre_similarity: f64,
    ) -> DomainResult<MediationResult> {
        let request = CompletionRequest::new(format!(
            "The UI integration layer below does not match the backend contract.\n\n\
             ## Backend contract\n{backend_artifact}\n\n## Current UI artifact\n{ui_artifact}\n\n\
             Rewrite the UI artifact so its data hooks call exactly the endpoints the \
             backend exposes, preserving component structure. Respond with the revised \
             artifact only."
        ))
        .with_system(
            "You reconcile frontend integration code with backend API contracts.",
        );

        let response = self.gateway.complete(request).await?;
        let fixed_artifact = response.text;

        let fixed_vec = self.gateway.embed(&fixed_artifact).await?;
        let backend_vec = self.gateway.embed(backend_artifact).await?;
        let post_similarity = cosine_similarity(&fixed_vec, &backend_vec);

        self.events
            .append(&SwarmEvent::new(
                swarm_id,
                EventKind::ConflictResolved,
                json!({
                    "pre_similarity": pre_similarity,
                    "post_similarity": post_similarity,
                }),
            ))
            .await?;
        self.metrics.incr_counter(names::CONFLICTS_RESOLVED, 1, &[]);
        self.metrics.observe_histogram(names::CONFLICT_SIMILARITY, post_similarity);

        Ok(MediationResult { fixed_artifact, pre_similarity, post_similarity })
    }
}
