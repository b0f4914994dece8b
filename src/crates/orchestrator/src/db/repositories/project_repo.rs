//! Project repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Project;
use chrono::Utc;

/// Project repository for managing project database operations
pub struct ProjectRepository;

impl ProjectRepository {
    /// Create a new project
    pub async fn create(
        pool: &DatabasePool,
        id: String,
        name: String,
        path: String,
    ) -> Result<Project, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, Project>(
            "INSERT INTO projects (id, name, path, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&id)
        .bind(&name)
        .bind(&path)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get a project by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all projects, newest first
    pub async fn list(pool: &DatabasePool) -> Result<Vec<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    /// Rename a project
    pub async fn rename(pool: &DatabasePool, id: &str, name: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE projects SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Store the structured vibe brief JSON
    pub async fn set_vibe_brief(
        pool: &DatabasePool,
        id: &str,
        vibe_brief: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE projects SET vibe_brief = ?, updated_at = ? WHERE id = ?")
            .bind(vibe_brief)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a project and everything scoped to it
    ///
    /// Cascades over chats, messages, executions, runs, token usage, and
    /// snapshots; the caller removes the working tree from disk.
    pub async fn delete_cascade(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "DELETE FROM messages WHERE chat_id IN (SELECT id FROM chats WHERE project_id = ?)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        sqlx::query(
            "DELETE FROM agent_executions WHERE chat_id IN (SELECT id FROM chats WHERE project_id = ?)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        sqlx::query(
            "DELETE FROM pipeline_runs WHERE chat_id IN (SELECT id FROM chats WHERE project_id = ?)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        sqlx::query(
            "DELETE FROM token_usage WHERE chat_id IN (SELECT id FROM chats WHERE project_id = ?)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        sqlx::query("DELETE FROM snapshots WHERE project_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM chats WHERE project_id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
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
    async fn test_create_and_get() {
        let db = Database::in_memory().await.unwrap();
        let project = ProjectRepository::create(
            db.pool(),
            "p1".to_string(),
            "Landing".to_string(),
            "/tmp/p1".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(project.name, "Landing");

        let found = ProjectRepository::get_by_id(db.pool(), "p1").await.unwrap();
        assert!(found.is_some());
        assert!(ProjectRepository::get_by_id(db.pool(), "ghost")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rename() {
        let db = Database::in_memory().await.unwrap();
        ProjectRepository::create(db.pool(), "p1".into(), "Old".into(), "/tmp/p1".into())
            .await
            .unwrap();
        ProjectRepository::rename(db.pool(), "p1", "New").await.unwrap();
        let project = ProjectRepository::get_by_id(db.pool(), "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.name, "New");
    }

    #[tokio::test]
    async fn test_delete_cascade() {
        let db = Database::in_memory().await.unwrap();
        ProjectRepository::create(db.pool(), "p1".into(), "P".into(), "/tmp/p1".into())
            .await
            .unwrap();
        crate::db::repositories::ChatRepository::create(
            db.pool(),
            "c1".into(),
            "p1".into(),
            "Chat".into(),
        )
        .await
        .unwrap();

        ProjectRepository::delete_cascade(db.pool(), "p1").await.unwrap();
        assert!(ProjectRepository::get_by_id(db.pool(), "p1")
            .await
            .unwrap()
            .is_none());
        assert!(
            crate::db::repositories::ChatRepository::get_by_id(db.pool(), "c1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
