//! Database row models
//!
//! All timestamps are ISO8601 strings due to SQLite type limitations.
//! JSON-bearing columns (`metadata`, `input`, `output`, `planned_agents`,
//! `file_manifest`, `vibe_brief`) are serialized strings parsed by callers.

mod chat;
mod execution;
mod message;
mod pipeline_run;
mod project;
mod snapshot;
mod token_usage;

pub use chat::Chat;
pub use execution::{AgentExecution, ExecutionStatus};
pub use message::Message;
pub use pipeline_run::{PipelineRun, PlannedAgents, RunStatus};
pub use project::Project;
pub use snapshot::Snapshot;
pub use token_usage::TokenUsageRow;
