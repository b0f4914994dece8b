//! Agent execution model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Execution status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Queued
    Pending,
    /// Executing
    Running,
    /// Finished successfully
    Completed,
    /// Failed terminally
    Failed,
    /// Transient failure, retry scheduled
    Retrying,
    /// Cancelled by user stop
    Stopped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Retrying => "retrying",
            ExecutionStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// One agent or action invocation
///
/// Rows are append-only modulo status transitions. `output` holds a JSON
/// object whose `content` field is the authoritative text used to
/// reconstruct upstream results on resume. `agent_name` stores the plan
/// step key (node instance id), which equals the agent name on stock
/// templates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecution {
    /// Unique execution identifier (UUID string)
    pub id: String,

    /// Owning chat
    pub chat_id: String,

    /// Plan step key
    pub agent_name: String,

    /// Current status
    pub status: String,

    /// Serialized input (prompt or action config)
    pub input: Option<String>,

    /// Serialized output; `output.content` is the step's result text
    pub output: Option<String>,

    /// Error description when failed
    pub error: Option<String>,

    /// Transient retry count
    pub retry_count: i64,

    /// Start timestamp (ISO8601 string)
    pub started_at: String,

    /// Completion timestamp (ISO8601 string)
    pub completed_at: Option<String>,
}

impl AgentExecution {
    /// Extract the result text from the serialized output
    pub fn output_content(&self) -> Option<String> {
        let raw = self.output.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_content_extraction() {
        let execution = AgentExecution {
            id: "e1".to_string(),
            chat_id: "c1".to_string(),
            agent_name: "research".to_string(),
            status: "completed".to_string(),
            input: None,
            output: Some(r#"{"content":"findings here"}"#.to_string()),
            error: None,
            retry_count: 0,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        };
        assert_eq!(execution.output_content().as_deref(), Some("findings here"));
    }

    #[test]
    fn test_output_content_tolerates_garbage() {
        let execution = AgentExecution {
            id: "e1".to_string(),
            chat_id: "c1".to_string(),
            agent_name: "research".to_string(),
            status: "completed".to_string(),
            input: None,
            output: Some("not json".to_string()),
            error: None,
            retry_count: 0,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        };
        assert!(execution.output_content().is_none());
    }
}
