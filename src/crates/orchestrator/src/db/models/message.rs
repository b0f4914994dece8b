//! Message model for database persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An immutable chat message
///
/// `metadata` is a JSON string whose `type` discriminator routes client
/// rendering (hides raw agent output, routes vibe/mood/checkpoint records to
/// structured card renderers).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier (UUID string)
    pub id: String,

    /// Owning chat
    pub chat_id: String,

    /// Role: user, assistant, or system
    pub role: String,

    /// Message text
    pub content: String,

    /// Producing agent, when not a plain user/assistant turn
    pub agent_name: Option<String>,

    /// Free-form metadata JSON with a `type` discriminator
    pub metadata: Option<String>,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,
}
