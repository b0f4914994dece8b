//! Project model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A workspace root owning a disk path and its chats
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project identifier (UUID string)
    pub id: String,

    /// Display name
    pub name: String,

    /// Working tree location on disk
    pub path: String,

    /// Structured vibe brief as a JSON string (adjectives, metaphor,
    /// target user, anti-references)
    pub vibe_brief: Option<String>,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,

    /// Last update timestamp (ISO8601 string)
    pub updated_at: String,
}
