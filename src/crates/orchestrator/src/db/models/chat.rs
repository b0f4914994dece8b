//! Chat model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A conversation scoped to a project
///
/// At most one pipeline run is active per chat at any time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Unique chat identifier (UUID string)
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Display title
    pub title: String,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,

    /// Last update timestamp (ISO8601 string)
    pub updated_at: String,
}
