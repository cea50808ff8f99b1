//! Domain ports (interfaces) implemented by `crate::adapters`.

pub mod agent_repository;
pub mod idempotency_repository;
pub mod project_repository;
pub mod task_log_repository;
pub mod task_repository;
pub mod task_type_defaults_repository;

pub use agent_repository::AgentRepository;
pub use idempotency_repository::IdempotencyRepository;
pub use project_repository::ProjectRepository;
pub use task_log_repository::TaskLogRepository;
pub use task_repository::{ClaimOutcome, TaskFilter, TaskRepository};
pub use task_type_defaults_repository::TaskTypeDefaultsRepository;
