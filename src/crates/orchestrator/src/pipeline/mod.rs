//! Pipeline scheduling and step execution plumbing
//!
//! The engine drives resolved plans; the rest of this module is the shared
//! machinery step tasks run on: the results map, retry policy, checkpoint
//! gates, budget checks, and the per-run context handed to every task.

pub mod budget;
pub mod checkpoints;
pub mod engine;
pub mod results;
pub mod retry;
pub mod template_store;

pub use checkpoints::CheckpointRegistry;
pub use engine::PipelineEngine;
pub use results::AgentResults;

use crate::config::{CostLimits, PipelineDefaults};
use crate::db::repositories::TokenUsageRepository;
use crate::db::Database;
use crate::events::{AgentStatus, EventBus, PipelineEvent};
use crate::artifacts::ArtifactStore;
use crate::Result;
use llm::{ChatProvider, PricingTable, TokenCounts};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a step task needs, shared behind an `Arc` across the run
pub struct StepContext {
    /// Owning chat
    pub chat_id: String,
    /// Owning project
    pub project_id: String,
    /// Durable run row id
    pub run_id: String,
    /// Original user message
    pub user_message: String,
    /// Database handle
    pub db: Database,
    /// Event bus
    pub bus: EventBus,
    /// Artifact store
    pub store: ArtifactStore,
    /// LLM provider
    pub provider: Arc<dyn ChatProvider>,
    /// Pricing table for cost estimation
    pub pricing: PricingTable,
    /// Pipeline defaults
    pub defaults: PipelineDefaults,
    /// Cost budget limits
    pub limits: CostLimits,
    /// Shared step outputs
    pub results: AgentResults,
    /// Run-scoped cancellation token
    pub cancel: CancellationToken,
    /// Pending checkpoint gates
    pub checkpoints: CheckpointRegistry,
    /// Chat-level YOLO flag
    pub yolo: bool,
    /// Base system prompt from an active config node
    pub base_system_prompt: Option<String>,
}

impl StepContext {
    /// Emit a status transition for a step
    pub fn emit_status(&self, agent: &str, status: AgentStatus) {
        self.bus.emit(PipelineEvent::AgentStatus {
            chat_id: self.chat_id.clone(),
            agent: agent.to_string(),
            status,
        });
    }

    /// Persist token usage, emit the usage event, and enforce the budget
    ///
    /// The usage row is written before the budget verdict so durable truth
    /// never lags the decision.
    pub async fn record_usage(
        &self,
        execution_id: Option<&str>,
        agent: &str,
        usage: &TokenCounts,
    ) -> Result<()> {
        let provider = self.provider.name();
        let model = self.provider.default_model();
        let cost = self.pricing.estimate(provider, model, usage);

        TokenUsageRepository::insert(
            self.db.pool(),
            execution_id,
            &self.chat_id,
            agent,
            provider,
            model,
            usage,
            cost,
        )
        .await?;

        self.bus.emit(PipelineEvent::TokenUsage {
            chat_id: self.chat_id.clone(),
            agent: agent.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_estimate: cost,
        });

        budget::check_budget(self.db.pool(), &self.limits, &self.chat_id, &self.project_id).await
    }

    /// Combined system prompt: config-node base, then the agent's role
    /// prompt, then any per-node override
    pub fn system_prompt(&self, role_prompt: Option<&str>, node_override: Option<&str>) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(base) = self.base_system_prompt.as_deref() {
            parts.push(base);
        }
        if let Some(role) = role_prompt {
            parts.push(role);
        }
        if let Some(over) = node_override {
            parts.push(over);
        }
        parts.join("\n\n")
    }
}
