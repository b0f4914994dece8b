//! Error types for flow template operations

use thiserror::Error;

/// Errors that can occur when parsing or resolving flow templates
#[derive(Debug, Error)]
pub enum FlowError {
    /// Template failed structural validation
    #[error("Template validation failed: {0}")]
    Validation(String),

    /// Condition expression could not be parsed
    #[error("Invalid condition expression: {0}")]
    Expression(String),

    /// Template references an unknown intent
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    /// Template references an unknown scope
    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
