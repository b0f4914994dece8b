//! Snapshot model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A versioned file manifest for a project+chat at a named label
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique snapshot identifier (UUID string)
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Producing chat
    pub chat_id: String,

    /// Snapshot label (e.g. `post-dev`, `build`)
    pub label: String,

    /// JSON manifest of relative path -> content
    pub file_manifest: String,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,
}
