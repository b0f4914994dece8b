//! Cost budget enforcement
//!
//! Durable truth lives in `token_usage`; after every insert the per-chat and
//! per-project cumulative estimates are compared to the configured limits.
//! A breach interrupts the run (resume-eligible) rather than failing it.

use crate::config::CostLimits;
use crate::db::repositories::TokenUsageRepository;
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};
use tracing::warn;

/// Check the chat and project budgets after a usage insert
///
/// Returns `CostLimitReached` naming the breached scope. Limits of zero are
/// disabled.
pub async fn check_budget(
    pool: &DatabasePool,
    limits: &CostLimits,
    chat_id: &str,
    project_id: &str,
) -> Result<()> {
    if limits.chat_cost_usd > 0.0 {
        let chat_cost = TokenUsageRepository::chat_cost(pool, chat_id).await?;
        if chat_cost >= limits.chat_cost_usd {
            warn!(
                chat = chat_id,
                cost = chat_cost,
                limit = limits.chat_cost_usd,
                "chat cost limit reached"
            );
            return Err(OrchestratorError::CostLimitReached(format!(
                "chat cost ${:.4} reached limit ${:.4}",
                chat_cost, limits.chat_cost_usd
            )));
        }
    }

    if limits.project_cost_usd > 0.0 {
        let project_cost = TokenUsageRepository::project_cost(pool, project_id).await?;
        if project_cost >= limits.project_cost_usd {
            warn!(
                project = project_id,
                cost = project_cost,
                limit = limits.project_cost_usd,
                "project cost limit reached"
            );
            return Err(OrchestratorError::CostLimitReached(format!(
                "project cost ${:.4} reached limit ${:.4}",
                project_cost, limits.project_cost_usd
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use llm::TokenCounts;

    async fn record_cost(db: &Database, chat_id: &str, cost: f64) {
        TokenUsageRepository::insert(
            db.pool(),
            None,
            chat_id,
            "research",
            "anthropic",
            "claude-sonnet-4-5",
            &TokenCounts::default(),
            cost,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limits_never_trip() {
        let db = Database::in_memory().await.unwrap();
        record_cost(&db, "c1", 100.0).await;
        let limits = CostLimits::default();
        assert!(check_budget(db.pool(), &limits, "c1", "p1").await.is_ok());
    }

    #[tokio::test]
    async fn test_chat_limit_trips() {
        let db = Database::in_memory().await.unwrap();
        record_cost(&db, "c1", 0.02).await;
        let limits = CostLimits {
            chat_cost_usd: 0.01,
            project_cost_usd: 0.0,
        };
        let result = check_budget(db.pool(), &limits, "c1", "p1").await;
        assert!(matches!(result, Err(OrchestratorError::CostLimitReached(_))));
    }

    #[tokio::test]
    async fn test_under_limit_passes() {
        let db = Database::in_memory().await.unwrap();
        record_cost(&db, "c1", 0.005).await;
        let limits = CostLimits {
            chat_cost_usd: 0.01,
            project_cost_usd: 0.0,
        };
        assert!(check_budget(db.pool(), &limits, "c1", "p1").await.is_ok());
    }
}
