//! Token usage repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::TokenUsageRow;
use chrono::Utc;
use llm::TokenCounts;
use uuid::Uuid;

/// Token usage repository
pub struct TokenUsageRepository;

impl TokenUsageRepository {
    /// Insert one accounting row for a completed call
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        pool: &DatabasePool,
        execution_id: Option<&str>,
        chat_id: &str,
        agent_name: &str,
        provider: &str,
        model: &str,
        usage: &TokenCounts,
        cost_estimate: f64,
    ) -> Result<TokenUsageRow, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, TokenUsageRow>(
            "INSERT INTO token_usage (id, execution_id, chat_id, agent_name, provider, model,
                                      input_tokens, output_tokens, cache_read_tokens,
                                      cache_write_tokens, total_tokens, cost_estimate, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(execution_id)
        .bind(chat_id)
        .bind(agent_name)
        .bind(provider)
        .bind(model)
        .bind(usage.input_tokens as i64)
        .bind(usage.output_tokens as i64)
        .bind(usage.cache_read_tokens as i64)
        .bind(usage.cache_write_tokens as i64)
        .bind(usage.total() as i64)
        .bind(cost_estimate)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Cumulative estimated cost for a chat
    pub async fn chat_cost(pool: &DatabasePool, chat_id: &str) -> Result<f64, sqlx::Error> {
        let row: (Option<f64>,) =
            sqlx::query_as("SELECT SUM(cost_estimate) FROM token_usage WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(pool)
                .await?;
        Ok(row.0.unwrap_or(0.0))
    }

    /// Cumulative estimated cost for a project across all of its chats
    pub async fn project_cost(pool: &DatabasePool, project_id: &str) -> Result<f64, sqlx::Error> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(cost_estimate) FROM token_usage
             WHERE chat_id IN (SELECT id FROM chats WHERE project_id = ?)",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0.unwrap_or(0.0))
    }

    /// List a chat's usage rows, newest first
    pub async fn list_by_chat(
        pool: &DatabasePool,
        chat_id: &str,
    ) -> Result<Vec<TokenUsageRow>, sqlx::Error> {
        sqlx::query_as::<_, TokenUsageRow>(
            "SELECT * FROM token_usage WHERE chat_id = ? ORDER BY created_at DESC",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
    }
}
