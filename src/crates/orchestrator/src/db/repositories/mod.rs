//! Database repositories
//!
//! One unit struct per table; every operation is an associated async
//! function taking the pool, so callers stay free to share a single pool
//! handle across tasks.

mod chat_repo;
mod execution_repo;
mod message_repo;
mod project_repo;
mod run_repo;
mod settings_repo;
mod snapshot_repo;
mod token_usage_repo;

pub use chat_repo::ChatRepository;
pub use execution_repo::ExecutionRepository;
pub use message_repo::MessageRepository;
pub use project_repo::ProjectRepository;
pub use run_repo::RunRepository;
pub use settings_repo::{SettingsRepository, FLOW_ACTIVE_PREFIX, FLOW_TEMPLATE_PREFIX};
pub use snapshot_repo::SnapshotRepository;
pub use token_usage_repo::TokenUsageRepository;
