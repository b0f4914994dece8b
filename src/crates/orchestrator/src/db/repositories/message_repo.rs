//! Message repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Message;
use chrono::Utc;
use uuid::Uuid;

/// Message repository for managing message database operations
pub struct MessageRepository;

impl MessageRepository {
    /// Append a message; messages are immutable once written
    pub async fn create(
        pool: &DatabasePool,
        chat_id: &str,
        role: &str,
        content: &str,
        agent_name: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<Message, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, Message>(
            "INSERT INTO messages (id, chat_id, role, content, agent_name, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .bind(agent_name)
        .bind(metadata)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// List a chat's messages in order
    pub async fn list_by_chat(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
    }

    /// Count a chat's messages
    pub async fn count_by_chat(pool: &DatabasePool, chat_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_append_and_list() {
        let db = Database::in_memory().await.unwrap();
        MessageRepository::create(db.pool(), "c1", "user", "Build a page", None, None)
            .await
            .unwrap();
        MessageRepository::create(
            db.pool(),
            "c1",
            "assistant",
            "{\"issues\":[]}",
            Some("code-review"),
            Some(r#"{"type":"agent-output","hidden":true}"#),
        )
        .await
        .unwrap();

        let messages = MessageRepository::list_by_chat(db.pool(), "c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].agent_name.as_deref(), Some("code-review"));
        assert_eq!(MessageRepository::count_by_chat(db.pool(), "c1").await.unwrap(), 2);
    }
}
