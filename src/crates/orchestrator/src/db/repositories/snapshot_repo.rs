//! Snapshot repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Snapshot;
use chrono::Utc;
use uuid::Uuid;

/// Snapshot repository
pub struct SnapshotRepository;

impl SnapshotRepository {
    /// Store a labeled file manifest
    pub async fn create(
        pool: &DatabasePool,
        project_id: &str,
        chat_id: &str,
        label: &str,
        file_manifest: &str,
    ) -> Result<Snapshot, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, Snapshot>(
            "INSERT INTO snapshots (id, project_id, chat_id, label, file_manifest, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(chat_id)
        .bind(label)
        .bind(file_manifest)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// List a project's snapshots, newest first
    pub async fn list_by_project(
        pool: &DatabasePool,
        project_id: &str,
    ) -> Result<Vec<Snapshot>, sqlx::Error> {
        sqlx::query_as::<_, Snapshot>(
            "SELECT * FROM snapshots WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Get a snapshot by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<Snapshot>, sqlx::Error> {
        sqlx::query_as::<_, Snapshot>("SELECT * FROM snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_create_and_list() {
        let db = Database::in_memory().await.unwrap();
        SnapshotRepository::create(db.pool(), "p1", "c1", "post-dev", r#"{"index.html":"<html/>"}"#)
            .await
            .unwrap();
        SnapshotRepository::create(db.pool(), "p1", "c1", "build", "{}")
            .await
            .unwrap();

        let snapshots = SnapshotRepository::list_by_project(db.pool(), "p1").await.unwrap();
        assert_eq!(snapshots.len(), 2);
    }
}
