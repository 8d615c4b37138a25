//! SQLite adapters for the repository ports.

pub mod agent_repository;
pub mod checkpoint_repository;
pub mod database;
pub mod escalation_repository;
pub mod event_repository;
pub mod swarm_repository;
pub mod task_repository;
pub mod template_repository;

pub use agent_repository::SqliteAgentRepository;
pub use checkpoint_repository::SqliteCheckpointRepository;
pub use database::{Database, StoreSetupError};
pub use escalation_repository::SqliteEscalationRepository;
pub use event_repository::SqliteEventRepository;
pub use swarm_repository::SqliteSwarmRepository;
pub use task_repository::SqliteTaskRepository;
pub use template_repository::SqliteTemplateRepository;
