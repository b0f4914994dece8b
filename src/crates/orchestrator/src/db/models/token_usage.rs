//! Token usage model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-call token accounting linked to an execution and a chat
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageRow {
    /// Unique row identifier (UUID string)
    pub id: String,

    /// Producing execution, when known
    pub execution_id: Option<String>,

    /// Owning chat
    pub chat_id: String,

    /// Plan step key
    pub agent_name: String,

    /// Provider name (`anthropic`, `openai`, ...)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Hash of the API key used, for per-key reporting
    pub api_key_hash: Option<String>,

    /// Prompt tokens
    pub input_tokens: i64,

    /// Completion tokens
    pub output_tokens: i64,

    /// Prompt-cache reads
    pub cache_read_tokens: i64,

    /// Prompt-cache writes
    pub cache_write_tokens: i64,

    /// Total billable tokens
    pub total_tokens: i64,

    /// Estimated cost in USD
    pub cost_estimate: f64,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,
}
