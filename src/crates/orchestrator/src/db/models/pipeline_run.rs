//! Pipeline run model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Run status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Actively dispatching steps
    Running,
    /// Finished cleanly
    Completed,
    /// Terminated by an internal error
    Failed,
    /// Halted but resume-eligible (cost limit, user stop, server restart)
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Interrupted => "interrupted",
        };
        write!(f, "{}", s)
    }
}

/// Durable record of one pipeline run, the anchor of the resume protocol
///
/// `planned_agents` is a JSON object holding the planned step order plus the
/// resolution context, so an interrupted run can be re-resolved with the
/// same inputs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// Unique run identifier (UUID string)
    pub id: String,

    /// Owning chat; at most one `running` row per chat
    pub chat_id: String,

    /// Classified intent
    pub intent: String,

    /// Classified scope
    pub scope: String,

    /// Original user message
    pub user_message: String,

    /// Serialized plan announcement and resolution context
    pub planned_agents: String,

    /// Current status
    pub status: String,

    /// Start timestamp (ISO8601 string)
    pub started_at: String,

    /// Completion timestamp (ISO8601 string)
    pub completed_at: Option<String>,
}

/// The JSON payload stored in `planned_agents`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAgents {
    /// Active node ids in planned order
    pub planned_order: Vec<String>,

    /// Resolution context the template was resolved against
    pub context: flow_core::ResolutionContext,
}

impl PipelineRun {
    /// Parse the stored plan payload
    pub fn planned(&self) -> Option<PlannedAgents> {
        serde_json::from_str(&self.planned_agents).ok()
    }
}
