//! Pipeline run repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::{PipelineRun, RunStatus};
use chrono::Utc;
use uuid::Uuid;

/// Pipeline run repository
pub struct RunRepository;

impl RunRepository {
    /// Insert a running row for a freshly-resolved pipeline
    pub async fn create(
        pool: &DatabasePool,
        chat_id: &str,
        intent: &str,
        scope: &str,
        user_message: &str,
        planned_agents: &str,
    ) -> Result<PipelineRun, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, PipelineRun>(
            "INSERT INTO pipeline_runs (id, chat_id, intent, scope, user_message, planned_agents, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chat_id)
        .bind(intent)
        .bind(scope)
        .bind(user_message)
        .bind(planned_agents)
        .bind(RunStatus::Running.to_string())
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get a run by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<PipelineRun>, sqlx::Error> {
        sqlx::query_as::<_, PipelineRun>("SELECT * FROM pipeline_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update a run's status, stamping completion for terminal states
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: RunStatus,
    ) -> Result<(), sqlx::Error> {
        let completed_at = match status {
            RunStatus::Running => None,
            _ => Some(Utc::now().to_rfc3339()),
        };
        sqlx::query("UPDATE pipeline_runs SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(completed_at)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// The chat's currently-running row, if any
    pub async fn running_for_chat(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<Option<PipelineRun>, sqlx::Error> {
        sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs WHERE chat_id = ? AND status = 'running'
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(pool)
        .await
    }

    /// The chat's most recent interrupted row, if any; resume starts here
    pub async fn latest_interrupted_for_chat(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<Option<PipelineRun>, sqlx::Error> {
        sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs WHERE chat_id = ? AND status = 'interrupted'
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(pool)
        .await
    }

    /// Rewrite every running row to interrupted; called once at startup
    pub async fn interrupt_all_running(pool: &DatabasePool) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE pipeline_runs SET status = ?, completed_at = ? WHERE status = 'running'",
        )
        .bind(RunStatus::Interrupted.to_string())
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::Database;

    #[tokio::test]
    async fn test_create_and_transition() {
        let db = Database::in_memory().await.unwrap();
        let run = RunRepository::create(db.pool(), "c1", "build", "full", "msg", "{}")
            .await
            .unwrap();
        assert_eq!(run.status, "running");
        assert!(RunRepository::running_for_chat(db.pool(), "c1")
            .await
            .unwrap()
            .is_some());

        RunRepository::update_status(db.pool(), &run.id, RunStatus::Interrupted)
            .await
            .unwrap();
        let row = RunRepository::get_by_id(db.pool(), &run.id).await.unwrap().unwrap();
        assert_eq!(row.status, "interrupted");
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_latest_interrupted() {
        let db = Database::in_memory().await.unwrap();
        let first = RunRepository::create(db.pool(), "c1", "build", "full", "msg", "{}")
            .await
            .unwrap();
        RunRepository::update_status(db.pool(), &first.id, RunStatus::Completed)
            .await
            .unwrap();
        let second = RunRepository::create(db.pool(), "c1", "fix", "backend", "msg2", "{}")
            .await
            .unwrap();
        RunRepository::update_status(db.pool(), &second.id, RunStatus::Interrupted)
            .await
            .unwrap();

        let latest = RunRepository::latest_interrupted_for_chat(db.pool(), "c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_startup_interrupts_running_rows() {
        let db = Database::in_memory().await.unwrap();
        RunRepository::create(db.pool(), "c1", "build", "full", "msg", "{}")
            .await
            .unwrap();
        RunRepository::create(db.pool(), "c2", "fix", "styling", "msg", "{}")
            .await
            .unwrap();

        let rewritten = RunRepository::interrupt_all_running(db.pool()).await.unwrap();
        assert_eq!(rewritten, 2);
        assert!(RunRepository::running_for_chat(db.pool(), "c1")
            .await
            .unwrap()
            .is_none());
    }
}
