//! Pipeline orchestration engine for pageforge
//!
//! This crate drives resolved execution plans to completion: it classifies
//! intent, selects and resolves a flow template, dispatches agent and action
//! steps in dependency order with cooperative cancellation, persists every
//! state transition for resume, and broadcasts a typed event stream to
//! connected clients.

pub mod actions;
pub mod agents;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod db;
pub mod events;
pub mod pipeline;

use thiserror::Error;

/// Errors that can occur during orchestration
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Template failed validation at save time
    #[error("Template invalid: {0}")]
    TemplateInvalid(String),

    /// Pipeline execution failed
    #[error("Pipeline execution failed: {0}")]
    ExecutionFailed(String),

    /// A step exceeded its wall-clock budget
    #[error("Step timed out after {0}ms")]
    StepTimeout(u64),

    /// Cost budget breached; the run is interrupted, not failed
    #[error("Cost limit reached: {0}")]
    CostLimitReached(String),

    /// Run was cancelled by the user or a newer run on the same chat
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A tool call failed; the agent stream continues
    #[error("Tool error: {0}")]
    ToolError(String),

    /// Flow model error
    #[error(transparent)]
    Flow(#[from] flow_core::FlowError),

    /// LLM provider error
    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Artifact store I/O error
    #[error("Artifact store error: {0}")]
    Artifacts(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal error; the run is marked failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether the error should interrupt the whole pipeline rather than
    /// just fail the step that raised it
    pub fn is_pipeline_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::CostLimitReached(_)
                | OrchestratorError::Cancelled
                | OrchestratorError::Database(_)
        )
    }

    /// Whether a step-level retry may help
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Llm(e) => e.is_retryable(),
            OrchestratorError::StepTimeout(_) => false,
            _ => false,
        }
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_classification() {
        assert!(OrchestratorError::Cancelled.is_pipeline_fatal());
        assert!(OrchestratorError::CostLimitReached("chat".into()).is_pipeline_fatal());
        assert!(!OrchestratorError::ToolError("bad args".into()).is_pipeline_fatal());
        assert!(!OrchestratorError::StepTimeout(1000).is_pipeline_fatal());
    }

    #[test]
    fn test_retry_classification() {
        let transient = OrchestratorError::Llm(llm::LlmError::RateLimitExceeded("429".into()));
        assert!(transient.is_retryable());

        let fatal = OrchestratorError::Llm(llm::LlmError::AuthenticationError("401".into()));
        assert!(!fatal.is_retryable());

        assert!(!OrchestratorError::StepTimeout(5000).is_retryable());
    }
}
