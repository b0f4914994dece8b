//! App settings repository for database operations
//!
//! A flat key/value store. Flow templates live under `flow.template.<id>`,
//! active intent bindings under `flow.active.<intent>`, and per-chat flags
//! like YOLO mode under `chat.yolo.<chatId>`.

use crate::db::connection::DatabasePool;

/// Settings key prefix for stored flow templates
pub const FLOW_TEMPLATE_PREFIX: &str = "flow.template.";

/// Settings key prefix for active template bindings
pub const FLOW_ACTIVE_PREFIX: &str = "flow.active.";

/// App settings repository
pub struct SettingsRepository;

impl SettingsRepository {
    /// Get a value by key
    pub async fn get(pool: &DatabasePool, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM app_settings WHERE key = ?")
                .bind(key)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Insert or replace a value
    pub async fn set(pool: &DatabasePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO app_settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a key
    pub async fn delete(pool: &DatabasePool, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM app_settings WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// List `(key, value)` pairs under a prefix
    pub async fn list_prefix(
        pool: &DatabasePool,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, sqlx::Error> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM app_settings WHERE key LIKE ? || '%' ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(pool)
        .await
    }

    /// Whether a chat has YOLO mode on
    pub async fn chat_yolo(pool: &DatabasePool, chat_id: &str) -> Result<bool, sqlx::Error> {
        let value = Self::get(pool, &format!("chat.yolo.{}", chat_id)).await?;
        Ok(matches!(value.as_deref(), Some("true") | Some("1")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_set_get_delete() {
        let db = Database::in_memory().await.unwrap();
        SettingsRepository::set(db.pool(), "flow.active.build", "default-build")
            .await
            .unwrap();
        assert_eq!(
            SettingsRepository::get(db.pool(), "flow.active.build")
                .await
                .unwrap()
                .as_deref(),
            Some("default-build")
        );

        SettingsRepository::set(db.pool(), "flow.active.build", "custom")
            .await
            .unwrap();
        assert_eq!(
            SettingsRepository::get(db.pool(), "flow.active.build")
                .await
                .unwrap()
                .as_deref(),
            Some("custom")
        );

        SettingsRepository::delete(db.pool(), "flow.active.build").await.unwrap();
        assert!(SettingsRepository::get(db.pool(), "flow.active.build")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let db = Database::in_memory().await.unwrap();
        SettingsRepository::set(db.pool(), "flow.template.a", "{}").await.unwrap();
        SettingsRepository::set(db.pool(), "flow.template.b", "{}").await.unwrap();
        SettingsRepository::set(db.pool(), "flow.active.build", "a").await.unwrap();

        let templates = SettingsRepository::list_prefix(db.pool(), FLOW_TEMPLATE_PREFIX)
            .await
            .unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].0, "flow.template.a");
    }

    #[tokio::test]
    async fn test_chat_yolo_flag() {
        let db = Database::in_memory().await.unwrap();
        assert!(!SettingsRepository::chat_yolo(db.pool(), "c1").await.unwrap());
        SettingsRepository::set(db.pool(), "chat.yolo.c1", "true").await.unwrap();
        assert!(SettingsRepository::chat_yolo(db.pool(), "c1").await.unwrap());
    }
}
