//! Pipeline engine
//!
//! Per-chat lifecycle, intent classification, template resolution, the
//! dependency-gated dispatch loop, and the resume/stop/recovery protocols.
//! At most one orchestration runs per chat; starting a new one cancels the
//! previous. Chats sharing a project serialize on an advisory lock so two
//! pipelines never mutate one working tree concurrently.

use crate::agents::{classifier, runner};
use crate::actions;
use crate::artifacts::ArtifactStore;
use crate::config::ServerConfig;
use crate::db::models::{PlannedAgents, RunStatus};
use crate::db::repositories::{
    ChatRepository, ExecutionRepository, MessageRepository, RunRepository, SettingsRepository,
};
use crate::db::Database;
use crate::events::{AgentStatus, EventBus, PipelineEvent};
use crate::pipeline::checkpoints::CheckpointRegistry;
use crate::pipeline::results::AgentResults;
use crate::pipeline::{template_store, StepContext};
use crate::{OrchestratorError, Result};
use dashmap::DashMap;
use flow_core::resolver::{ExecutionPlan, PlanStep};
use flow_core::{resolve, ResolutionContext};
use llm::{ChatProvider, PricingTable};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Synthetic error written into in-flight executions at startup
pub const RESTART_ERROR: &str = "Server restarted — pipeline interrupted";

/// Handle to an active per-chat orchestration
struct RunHandle {
    cancel: CancellationToken,
}

/// Report returned by `/agents/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Whether an orchestration is active for the chat
    pub running: bool,
    /// The chat's execution rows, newest first
    pub executions: Vec<crate::db::models::AgentExecution>,
    /// Most recent interrupted run id, if resume is possible
    pub interrupted_pipeline_id: Option<String>,
}

/// Pipeline engine driving resolved plans
pub struct PipelineEngine {
    db: Database,
    bus: EventBus,
    store: ArtifactStore,
    provider: Arc<dyn ChatProvider>,
    pricing: PricingTable,
    config: ServerConfig,
    checkpoints: CheckpointRegistry,
    active: DashMap<String, RunHandle>,
    project_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PipelineEngine {
    /// Create an engine over the given infrastructure
    pub fn new(
        db: Database,
        bus: EventBus,
        store: ArtifactStore,
        provider: Arc<dyn ChatProvider>,
        config: ServerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            bus,
            store,
            provider,
            pricing: PricingTable::with_defaults(),
            config,
            checkpoints: CheckpointRegistry::new(),
            active: DashMap::new(),
            project_locks: DashMap::new(),
        })
    }

    /// The engine's checkpoint registry (the resolve endpoint talks to it)
    pub fn checkpoints(&self) -> &CheckpointRegistry {
        &self.checkpoints
    }

    /// The engine's event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Startup recovery: runs left `running` by a dead process become
    /// `interrupted`, and their in-flight executions get a synthetic error
    pub async fn recover_on_startup(&self) -> Result<(u64, u64)> {
        let runs = RunRepository::interrupt_all_running(self.db.pool()).await?;
        let executions =
            ExecutionRepository::interrupt_all_in_flight(self.db.pool(), RESTART_ERROR).await?;
        if runs > 0 {
            info!(runs, executions, "recovered interrupted pipelines at startup");
        }
        Ok((runs, executions))
    }

    /// Start an orchestration for a chat, cancelling any active one
    pub async fn start(self: &Arc<Self>, chat_id: &str, message: &str) -> Result<()> {
        self.launch(chat_id, Some(message.to_string())).await
    }

    /// Resume the chat's most recent interrupted run
    pub async fn resume(self: &Arc<Self>, chat_id: &str) -> Result<()> {
        self.launch(chat_id, None).await
    }

    async fn launch(self: &Arc<Self>, chat_id: &str, message: Option<String>) -> Result<()> {
        // Starting a new orchestration cancels the previous one
        if let Some((_, previous)) = self.active.remove(chat_id) {
            info!(chat = chat_id, "cancelling previous orchestration");
            previous.cancel.cancel();
        }

        let chat = ChatRepository::get_by_id(self.db.pool(), chat_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("chat {}", chat_id)))?;

        let cancel = CancellationToken::new();
        self.active.insert(
            chat_id.to_string(),
            RunHandle {
                cancel: cancel.clone(),
            },
        );

        let engine = self.clone();
        let chat_id = chat_id.to_string();
        tokio::spawn(async move {
            engine.drive(chat, message, cancel).await;
        });

        Ok(())
    }

    /// Stop the chat's orchestration; returns whether one was active
    pub async fn stop(&self, chat_id: &str) -> Result<bool> {
        let had_active = match self.active.remove(chat_id) {
            Some((_, handle)) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        };

        ExecutionRepository::stop_in_flight(self.db.pool(), chat_id).await?;
        if let Some(run) = RunRepository::running_for_chat(self.db.pool(), chat_id).await? {
            RunRepository::update_status(self.db.pool(), &run.id, RunStatus::Interrupted).await?;
        }
        self.bus.emit(PipelineEvent::AgentStatus {
            chat_id: chat_id.to_string(),
            agent: "orchestrator".to_string(),
            status: AgentStatus::Stopped,
        });

        Ok(had_active)
    }

    /// Status snapshot for `/agents/status`
    pub async fn status(&self, chat_id: &str) -> Result<StatusReport> {
        let executions = ExecutionRepository::list_by_chat(self.db.pool(), chat_id).await?;
        let interrupted =
            RunRepository::latest_interrupted_for_chat(self.db.pool(), chat_id).await?;
        Ok(StatusReport {
            running: self.active.contains_key(chat_id),
            executions,
            interrupted_pipeline_id: interrupted.map(|run| run.id),
        })
    }

    /// Top-level run wrapper: translates errors into terminal run states
    async fn drive(
        self: Arc<Self>,
        chat: crate::db::models::Chat,
        message: Option<String>,
        cancel: CancellationToken,
    ) {
        let chat_id = chat.id.clone();
        let outcome = self.run_pipeline(&chat, message, cancel).await;

        match outcome {
            Ok(run_id) => {
                if let Err(e) =
                    RunRepository::update_status(self.db.pool(), &run_id, RunStatus::Completed)
                        .await
                {
                    error!(chat = %chat_id, error = %e, "failed to mark run completed");
                }
                self.bus.emit(PipelineEvent::AgentStatus {
                    chat_id: chat_id.clone(),
                    agent: "orchestrator".to_string(),
                    status: AgentStatus::Completed,
                });
                info!(chat = %chat_id, "pipeline completed");
            }
            Err(DriveError { run_id, error }) => {
                self.finalize_error(&chat_id, run_id.as_deref(), &error).await;
            }
        }

        self.active.remove(&chat_id);
    }

    /// Record the terminal state for a failed/interrupted run
    async fn finalize_error(
        &self,
        chat_id: &str,
        run_id: Option<&str>,
        error: &OrchestratorError,
    ) {
        let terminal = match error {
            OrchestratorError::Cancelled => RunStatus::Interrupted,
            OrchestratorError::CostLimitReached(_) => RunStatus::Interrupted,
            _ => RunStatus::Failed,
        };

        if let Err(e) = ExecutionRepository::stop_in_flight(self.db.pool(), chat_id).await {
            error!(chat = chat_id, error = %e, "failed to stop in-flight executions");
        }
        if let Some(run_id) = run_id {
            if let Err(e) = RunRepository::update_status(self.db.pool(), run_id, terminal).await {
                error!(chat = chat_id, error = %e, "failed to mark run terminal");
            }
        }

        match error {
            OrchestratorError::CostLimitReached(_) => {
                self.bus.emit(PipelineEvent::PipelineInterrupted {
                    chat_id: chat_id.to_string(),
                    reason: "cost_limit".to_string(),
                });
            }
            OrchestratorError::Cancelled => {
                self.bus.emit(PipelineEvent::AgentStatus {
                    chat_id: chat_id.to_string(),
                    agent: "orchestrator".to_string(),
                    status: AgentStatus::Stopped,
                });
            }
            other => {
                self.bus.emit(PipelineEvent::AgentError {
                    chat_id: chat_id.to_string(),
                    agent: "orchestrator".to_string(),
                    error: other.to_string(),
                });
            }
        }

        warn!(chat = chat_id, error = %error, status = %terminal, "pipeline ended abnormally");
    }

    /// The full pipeline: classify, resolve, persist, dispatch
    ///
    /// Returns the run id on clean termination.
    async fn run_pipeline(
        self: &Arc<Self>,
        chat: &crate::db::models::Chat,
        message: Option<String>,
        cancel: CancellationToken,
    ) -> std::result::Result<String, DriveError> {
        let pool = self.db.pool();
        let chat_id = &chat.id;
        let project_id = &chat.project_id;
        let resume = message.is_none();

        // Chats on the same project serialize on an advisory lock
        let lock = self
            .project_locks
            .entry(project_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _project_guard = if self.config.project_lock_fail_fast {
            lock.clone().try_lock_owned().map_err(|_| DriveError {
                run_id: None,
                error: OrchestratorError::ExecutionFailed(format!(
                    "project {} is busy with another chat's pipeline",
                    project_id
                )),
            })?
        } else {
            tokio::select! {
                guard = lock.clone().lock_owned() => guard,
                _ = cancel.cancelled() => {
                    return Err(DriveError { run_id: None, error: OrchestratorError::Cancelled });
                }
            }
        };

        // Build the run record and the seeded results map
        let (run_id, context, plan, results, completed) = if resume {
            self.prepare_resume(chat_id).await.map_err(|error| DriveError {
                run_id: None,
                error,
            })?
        } else {
            let user_message = message.unwrap_or_default();
            self.prepare_fresh(chat, &user_message)
                .await
                .map_err(|error| DriveError { run_id: None, error })?
        };

        let fail = |run_id: &str, error: OrchestratorError| DriveError {
            run_id: Some(run_id.to_string()),
            error,
        };

        self.bus.emit(PipelineEvent::PipelinePlan {
            chat_id: chat_id.clone(),
            agents: plan.planned_order.clone(),
        });
        self.bus.emit(PipelineEvent::AgentStatus {
            chat_id: chat_id.clone(),
            agent: "orchestrator".to_string(),
            status: AgentStatus::Running,
        });

        let yolo = SettingsRepository::chat_yolo(pool, chat_id)
            .await
            .map_err(|e| fail(&run_id, e.into()))?;

        let ctx = Arc::new(StepContext {
            chat_id: chat_id.clone(),
            project_id: project_id.clone(),
            run_id: run_id.clone(),
            user_message: context.user_message.clone(),
            db: self.db.clone(),
            bus: self.bus.clone(),
            store: self.store.clone(),
            provider: self.provider.clone(),
            pricing: self.pricing.clone(),
            defaults: self.config.defaults.clone(),
            limits: self.config.limits,
            results,
            cancel,
            checkpoints: self.checkpoints.clone(),
            yolo,
            base_system_prompt: plan.base_system_prompt.clone(),
        });

        // Resumed steps are skipped; not-yet-completed steps re-announce
        for step in &plan.steps {
            if !completed.contains(step.key()) {
                ctx.emit_status(step.key(), AgentStatus::Pending);
            }
        }

        dispatch_loop(&ctx, &plan, completed)
            .await
            .map_err(|error| fail(&run_id, error))?;

        Ok(run_id)
    }

    /// Classify, resolve, and persist a fresh run
    async fn prepare_fresh(
        self: &Arc<Self>,
        chat: &crate::db::models::Chat,
        user_message: &str,
    ) -> Result<(String, ResolutionContext, ExecutionPlan, AgentResults, HashSet<String>)> {
        let pool = self.db.pool();
        let chat_id = &chat.id;

        self.store.ensure_project(&chat.project_id)?;

        // Record the user's message and derive a title for untitled chats
        let message_row =
            MessageRepository::create(pool, chat_id, "user", user_message, None, None).await?;
        self.bus.emit(PipelineEvent::ChatMessage {
            chat_id: chat_id.clone(),
            message: serde_json::to_value(&message_row)?,
        });
        if chat.title.is_empty() || chat.title == "New chat" {
            let title: String = user_message.chars().take(48).collect();
            ChatRepository::rename(pool, chat_id, &title).await?;
            self.bus.emit(PipelineEvent::ChatRenamed {
                chat_id: chat_id.clone(),
                title,
            });
        }

        let has_files = self.store.has_files(&chat.project_id);
        let classification =
            classifier::classify(&self.provider, user_message, has_files).await?;
        info!(
            chat = %chat_id,
            intent = %classification.intent,
            scope = %classification.scope,
            "classified request"
        );

        let template =
            template_store::active_template_for(pool, classification.intent).await?;
        let context = ResolutionContext {
            intent: classification.intent,
            scope: classification.scope,
            needs_backend: classification.needs_backend,
            has_files,
            user_message: user_message.to_string(),
        };
        let plan = resolve(&template, &context);

        let planned = PlannedAgents {
            planned_order: plan.planned_order.clone(),
            context: context.clone(),
        };
        let run = RunRepository::create(
            pool,
            chat_id,
            &context.intent.to_string(),
            &context.scope.to_string(),
            user_message,
            &serde_json::to_string(&planned)?,
        )
        .await?;

        Ok((run.id, context, plan, AgentResults::new(), HashSet::new()))
    }

    /// Rebuild an interrupted run's state from the database
    async fn prepare_resume(
        self: &Arc<Self>,
        chat_id: &str,
    ) -> Result<(String, ResolutionContext, ExecutionPlan, AgentResults, HashSet<String>)> {
        let pool = self.db.pool();

        let run = RunRepository::latest_interrupted_for_chat(pool, chat_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("no interrupted run for chat {}", chat_id))
            })?;
        let planned = run.planned().ok_or_else(|| {
            OrchestratorError::Internal(format!("run {} has unreadable plan payload", run.id))
        })?;
        let context = planned.context;

        // Completed executions become the seeded results map; their keys are
        // skipped on re-dispatch
        let outputs = ExecutionRepository::completed_outputs(pool, chat_id).await?;
        let completed: HashSet<String> = outputs.keys().cloned().collect();
        debug!(
            chat = chat_id,
            run = %run.id,
            completed = completed.len(),
            "resuming interrupted run"
        );

        let template = template_store::active_template_for(pool, context.intent).await?;
        let plan = resolve(&template, &context);

        RunRepository::update_status(pool, &run.id, RunStatus::Running).await?;

        Ok((
            run.id,
            context,
            plan,
            AgentResults::seeded(outputs),
            completed,
        ))
    }
}

/// Error carrying the run id so terminal status can be recorded
struct DriveError {
    run_id: Option<String>,
    error: OrchestratorError,
}

/// Dependency-gated dispatch: launch every step whose dependencies are
/// complete, wait for any completion, recompute, repeat
async fn dispatch_loop(
    ctx: &Arc<StepContext>,
    plan: &ExecutionPlan,
    mut completed: HashSet<String>,
) -> Result<()> {
    let mut failed: HashSet<String> = HashSet::new();
    let mut dispatched: HashSet<String> = HashSet::new();
    let mut join_set: JoinSet<(String, Result<()>)> = JoinSet::new();

    loop {
        // Steps downstream of a failure can never become eligible
        let mut newly_skipped = Vec::new();
        for step in &plan.steps {
            let key = step.key();
            if completed.contains(key) || failed.contains(key) || dispatched.contains(key) {
                continue;
            }
            if step.depends_on().iter().any(|dep| failed.contains(dep)) {
                debug!(step = key, "skipping step downstream of a failure");
                newly_skipped.push(key.to_string());
            }
        }
        failed.extend(newly_skipped);

        for step in &plan.steps {
            let key = step.key().to_string();
            if completed.contains(&key) || failed.contains(&key) || dispatched.contains(&key) {
                continue;
            }
            if !step.depends_on().iter().all(|dep| completed.contains(dep)) {
                continue;
            }

            dispatched.insert(key.clone());
            let ctx = ctx.clone();
            let step = step.clone();
            join_set.spawn(async move {
                let result = match &step {
                    PlanStep::Agent(agent_step) => runner::run_agent_step(&ctx, agent_step).await,
                    PlanStep::Action(action_step) => {
                        actions::execute_action(&ctx, action_step).await
                    }
                };
                (key, result)
            });
        }

        if join_set.is_empty() {
            break;
        }

        let joined = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                join_set.shutdown().await;
                return Err(OrchestratorError::Cancelled);
            }
            joined = join_set.join_next() => joined,
        };

        match joined {
            None => break,
            Some(Err(join_error)) => {
                return Err(OrchestratorError::Internal(format!(
                    "step task panicked: {}",
                    join_error
                )));
            }
            Some(Ok((key, result))) => match result {
                Ok(()) => {
                    debug!(step = %key, "step completed");
                    completed.insert(key);
                }
                Err(error @ (OrchestratorError::Cancelled
                | OrchestratorError::CostLimitReached(_)
                | OrchestratorError::Database(_))) => {
                    // Pipeline-global: cancel peers and unwind
                    ctx.cancel.cancel();
                    join_set.shutdown().await;
                    return Err(error);
                }
                Err(error) => {
                    // Step-local: peers whose dependencies did not include
                    // this step keep running
                    warn!(step = %key, error = %error, "step failed");
                    failed.insert(key);
                }
            },
        }
    }

    Ok(())
}
