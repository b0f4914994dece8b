//! Agent execution repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::{AgentExecution, ExecutionStatus};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Agent execution repository
pub struct ExecutionRepository;

impl ExecutionRepository {
    /// Record the start of an execution
    pub async fn start(
        pool: &DatabasePool,
        chat_id: &str,
        agent_name: &str,
        input: Option<&str>,
    ) -> Result<AgentExecution, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, AgentExecution>(
            "INSERT INTO agent_executions (id, chat_id, agent_name, status, input, retry_count, started_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chat_id)
        .bind(agent_name)
        .bind(ExecutionStatus::Running.to_string())
        .bind(input)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get an execution by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<AgentExecution>, sqlx::Error> {
        sqlx::query_as::<_, AgentExecution>("SELECT * FROM agent_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark an execution completed with its serialized output
    pub async fn complete(
        pool: &DatabasePool,
        id: &str,
        output: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE agent_executions SET status = ?, output = ?, completed_at = ? WHERE id = ?",
        )
        .bind(ExecutionStatus::Completed.to_string())
        .bind(output)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark an execution failed; the error is recorded before any event is
    /// emitted for it
    pub async fn fail(pool: &DatabasePool, id: &str, error: &str) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE agent_executions SET status = ?, error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(ExecutionStatus::Failed.to_string())
        .bind(error)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Bump the retry counter and flag the row as retrying
    pub async fn mark_retrying(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE agent_executions SET status = ?, retry_count = retry_count + 1 WHERE id = ?",
        )
        .bind(ExecutionStatus::Retrying.to_string())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Flip the row back to running after a retry backoff
    pub async fn mark_running(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE agent_executions SET status = ? WHERE id = ?")
            .bind(ExecutionStatus::Running.to_string())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Transition every in-flight execution of a chat to stopped
    pub async fn stop_in_flight(pool: &DatabasePool, chat_id: &str) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE agent_executions SET status = ?, completed_at = ?
             WHERE chat_id = ? AND status IN ('running', 'retrying', 'pending')",
        )
        .bind(ExecutionStatus::Stopped.to_string())
        .bind(&now)
        .bind(chat_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Write a synthetic error into every in-flight execution at startup
    pub async fn interrupt_all_in_flight(
        pool: &DatabasePool,
        error: &str,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE agent_executions SET status = ?, error = ?, completed_at = ?
             WHERE status IN ('running', 'retrying', 'pending')",
        )
        .bind(ExecutionStatus::Failed.to_string())
        .bind(error)
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List a chat's executions, newest first
    pub async fn list_by_chat(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<Vec<AgentExecution>, sqlx::Error> {
        sqlx::query_as::<_, AgentExecution>(
            "SELECT * FROM agent_executions WHERE chat_id = ? ORDER BY started_at DESC",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
    }

    /// Latest completed output per step key for a chat
    ///
    /// The map this returns is what resume rebuilds `agentResults` from:
    /// step key -> parsed `output.content`.
    pub async fn completed_outputs(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AgentExecution>(
            "SELECT * FROM agent_executions
             WHERE chat_id = ? AND status = 'completed'
             ORDER BY started_at ASC",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await?;

        let mut outputs = HashMap::new();
        for row in rows {
            if let Some(content) = row.output_content() {
                // Later rows win: the most recent completion is authoritative
                outputs.insert(row.agent_name, content);
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_lifecycle() {
        let db = Database::in_memory().await.unwrap();
        let execution = ExecutionRepository::start(db.pool(), "c1", "research", Some("prompt"))
            .await
            .unwrap();
        assert_eq!(execution.status, "running");

        ExecutionRepository::complete(db.pool(), &execution.id, r#"{"content":"done"}"#)
            .await
            .unwrap();
        let row = ExecutionRepository::get_by_id(db.pool(), &execution.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.output_content().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_completed_outputs_latest_wins() {
        let db = Database::in_memory().await.unwrap();
        let first = ExecutionRepository::start(db.pool(), "c1", "research", None)
            .await
            .unwrap();
        ExecutionRepository::complete(db.pool(), &first.id, r#"{"content":"old"}"#)
            .await
            .unwrap();
        let second = ExecutionRepository::start(db.pool(), "c1", "research", None)
            .await
            .unwrap();
        ExecutionRepository::complete(db.pool(), &second.id, r#"{"content":"new"}"#)
            .await
            .unwrap();

        let outputs = ExecutionRepository::completed_outputs(db.pool(), "c1")
            .await
            .unwrap();
        assert_eq!(outputs.get("research").map(|s| s.as_str()), Some("new"));
    }

    #[tokio::test]
    async fn test_stop_in_flight() {
        let db = Database::in_memory().await.unwrap();
        ExecutionRepository::start(db.pool(), "c1", "research", None)
            .await
            .unwrap();
        ExecutionRepository::start(db.pool(), "c1", "architect", None)
            .await
            .unwrap();
        let other = ExecutionRepository::start(db.pool(), "c2", "research", None)
            .await
            .unwrap();

        let stopped = ExecutionRepository::stop_in_flight(db.pool(), "c1").await.unwrap();
        assert_eq!(stopped, 2);

        // The other chat's execution is untouched
        let row = ExecutionRepository::get_by_id(db.pool(), &other.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "running");
    }

    #[tokio::test]
    async fn test_interrupt_all_writes_synthetic_error() {
        let db = Database::in_memory().await.unwrap();
        let execution = ExecutionRepository::start(db.pool(), "c1", "research", None)
            .await
            .unwrap();

        ExecutionRepository::interrupt_all_in_flight(
            db.pool(),
            "Server restarted — pipeline interrupted",
        )
        .await
        .unwrap();

        let row = ExecutionRepository::get_by_id(db.pool(), &execution.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(
            row.error.as_deref(),
            Some("Server restarted — pipeline interrupted")
        );
    }
}
