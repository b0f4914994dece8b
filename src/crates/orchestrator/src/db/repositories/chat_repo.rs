//! Chat repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Chat;
use chrono::Utc;

/// Chat repository for managing chat database operations
pub struct ChatRepository;

impl ChatRepository {
    /// Create a new chat
    pub async fn create(
        pool: &DatabasePool,
        id: String,
        project_id: String,
        title: String,
    ) -> Result<Chat, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, Chat>(
            "INSERT INTO chats (id, project_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&id)
        .bind(&project_id)
        .bind(&title)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get a chat by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Chat>, sqlx::Error> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List chats for a project, newest first
    pub async fn list_by_project(
        pool: &DatabasePool,
        project_id: &str,
    ) -> Result<Vec<Chat>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Rename a chat
    pub async fn rename(pool: &DatabasePool, id: &str, title: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE chats SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a chat and everything scoped to it
    pub async fn delete_cascade(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM agent_executions WHERE chat_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM pipeline_runs WHERE chat_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM token_usage WHERE chat_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_create_list_rename() {
        let db = Database::in_memory().await.unwrap();
        ChatRepository::create(db.pool(), "c1".into(), "p1".into(), "First".into())
            .await
            .unwrap();
        ChatRepository::create(db.pool(), "c2".into(), "p1".into(), "Second".into())
            .await
            .unwrap();

        let chats = ChatRepository::list_by_project(db.pool(), "p1").await.unwrap();
        assert_eq!(chats.len(), 2);

        ChatRepository::rename(db.pool(), "c1", "Renamed").await.unwrap();
        let chat = ChatRepository::get_by_id(db.pool(), "c1").await.unwrap().unwrap();
        assert_eq!(chat.title, "Renamed");
    }
}
