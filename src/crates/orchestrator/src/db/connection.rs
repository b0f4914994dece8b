//! Database connection management
//!
//! Provides the SQLite pool plus the idempotent schema migration. All
//! timestamp columns are ISO8601 strings due to SQLite type limitations;
//! nothing in memory survives restart, so these tables are the only durable
//! state the resume protocol can derive from.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    path        TEXT NOT NULL,
    vibe_brief  TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chats (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    title       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    chat_id     TEXT NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    agent_name  TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_executions (
    id           TEXT PRIMARY KEY,
    chat_id      TEXT NOT NULL,
    agent_name   TEXT NOT NULL,
    status       TEXT NOT NULL,
    input        TEXT,
    output       TEXT,
    error        TEXT,
    retry_count  INTEGER NOT NULL DEFAULT 0,
    started_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS pipeline_runs (
    id             TEXT PRIMARY KEY,
    chat_id        TEXT NOT NULL,
    intent         TEXT NOT NULL,
    scope          TEXT NOT NULL,
    user_message   TEXT NOT NULL,
    planned_agents TEXT NOT NULL,
    status         TEXT NOT NULL,
    started_at     TEXT NOT NULL,
    completed_at   TEXT
);

CREATE TABLE IF NOT EXISTS token_usage (
    id                 TEXT PRIMARY KEY,
    execution_id       TEXT,
    chat_id            TEXT NOT NULL,
    agent_name         TEXT NOT NULL,
    provider           TEXT NOT NULL,
    model              TEXT NOT NULL,
    api_key_hash       TEXT,
    input_tokens       INTEGER NOT NULL DEFAULT 0,
    output_tokens      INTEGER NOT NULL DEFAULT 0,
    cache_read_tokens  INTEGER NOT NULL DEFAULT 0,
    cache_write_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens       INTEGER NOT NULL DEFAULT 0,
    cost_estimate      REAL NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL,
    chat_id       TEXT NOT NULL,
    label         TEXT NOT NULL,
    file_manifest TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_project        ON chats (project_id);
CREATE INDEX IF NOT EXISTS idx_messages_chat        ON messages (chat_id);
CREATE INDEX IF NOT EXISTS idx_executions_chat      ON agent_executions (chat_id);
CREATE INDEX IF NOT EXISTS idx_runs_chat            ON pipeline_runs (chat_id);
CREATE INDEX IF NOT EXISTS idx_token_usage_chat     ON token_usage (chat_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_project    ON snapshots (project_id);
"#;

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<DatabasePool>,
}

impl Database {
    /// Connect and run the schema migration
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (e.g. "sqlite:pageforge.db"
    ///   or "sqlite::memory:")
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // An in-memory SQLite database exists per connection, so the pool
        // must stay at a single connection to see one coherent schema
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self {
            pool: Arc::new(pool),
        };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database for tests
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    /// Run the idempotent schema migration
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(self.pool.as_ref()).await?;
            }
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_migrate() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let db = Database::in_memory().await.unwrap();
        for table in [
            "projects",
            "chats",
            "messages",
            "agent_executions",
            "pipeline_runs",
            "token_usage",
            "snapshots",
            "app_settings",
        ] {
            let query = format!("SELECT COUNT(*) FROM {}", table);
            assert!(
                sqlx::query(&query).fetch_one(db.pool()).await.is_ok(),
                "table {} missing",
                table
            );
        }
    }
}
