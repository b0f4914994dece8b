//! Action step executors
//!
//! Each executor is a pure step runner: inputs come from the step's resolved
//! settings and the shared results map, outputs land back in the results map
//! and in an `agent_executions` row. Build/test failures are outcomes that
//! drive fix loops, not exceptions.

pub mod build_check;
pub mod llm_step;
pub mod remediation;
pub mod snapshot;
pub mod test_run;

use crate::agents::tools;
use crate::artifacts::run_command;
use crate::db::repositories::{ExecutionRepository, MessageRepository};
use crate::events::{AgentStatus, PipelineEvent};
use crate::pipeline::StepContext;
use crate::{OrchestratorError, Result};
use flow_core::resolver::ActionStep;
use flow_core::ActionKind;
use llm::{ChatMessage, CompletionRequest};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Execute one action step with full lifecycle bookkeeping
pub async fn execute_action(ctx: &Arc<StepContext>, step: &ActionStep) -> Result<()> {
    let step_key = step.instance_id.clone();

    let execution = ExecutionRepository::start(
        ctx.db.pool(),
        &ctx.chat_id,
        &step_key,
        Some(&serde_json::to_string(&step.settings)?),
    )
    .await?;
    ctx.emit_status(&step_key, AgentStatus::Running);

    let outcome = dispatch(ctx, step, &execution.id).await;

    match outcome {
        Ok(content) => {
            ctx.results.insert(&step_key, content.clone());
            ExecutionRepository::complete(
                ctx.db.pool(),
                &execution.id,
                &json!({ "content": content }).to_string(),
            )
            .await?;
            ctx.emit_status(&step_key, AgentStatus::Completed);
            Ok(())
        }
        Err(e @ (OrchestratorError::Cancelled | OrchestratorError::CostLimitReached(_))) => {
            ExecutionRepository::stop_in_flight(ctx.db.pool(), &ctx.chat_id).await?;
            Err(e)
        }
        Err(e) => {
            ExecutionRepository::fail(ctx.db.pool(), &execution.id, &e.to_string()).await?;
            ctx.bus.emit(PipelineEvent::AgentError {
                chat_id: ctx.chat_id.clone(),
                agent: step_key.clone(),
                error: e.to_string(),
            });
            ctx.emit_status(&step_key, AgentStatus::Failed);
            Err(e)
        }
    }
}

async fn dispatch(
    ctx: &Arc<StepContext>,
    step: &ActionStep,
    execution_id: &str,
) -> Result<String> {
    match step.kind {
        ActionKind::BuildCheck => build_check::run(ctx, step, execution_id).await,
        ActionKind::TestRun => test_run::run(ctx, step, execution_id).await,
        ActionKind::Remediation => remediation::run(ctx, step, execution_id).await,
        ActionKind::Summary
        | ActionKind::VibeIntake
        | ActionKind::MoodAnalysis
        | ActionKind::Answer
        | ActionKind::LlmCall => llm_step::run(ctx, step, execution_id).await,
        ActionKind::Shell => run_shell(ctx, step).await,
        ActionKind::Snapshot => snapshot::run(ctx, step).await,
        ActionKind::Checkpoint => run_checkpoint(ctx, step).await,
    }
}

/// Single collected LLM call shared by action executors and fix loops
///
/// Persists token usage and enforces the budget before returning the text.
pub async fn complete_llm(
    ctx: &StepContext,
    execution_id: &str,
    step_key: &str,
    system: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String> {
    let request = CompletionRequest::new(vec![ChatMessage::user(prompt.to_string())])
        .with_system(system.to_string())
        .with_max_tokens(max_tokens);

    let completion = tokio::select! {
        result = ctx.provider.chat(request) => result?,
        _ = ctx.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
    };

    ctx.record_usage(Some(execution_id), step_key, &completion.usage)
        .await?;
    Ok(completion.content)
}

/// `shell` action: one command under the project directory
async fn run_shell(ctx: &Arc<StepContext>, step: &ActionStep) -> Result<String> {
    let command = step.settings.command.as_deref().ok_or_else(|| {
        OrchestratorError::ExecutionFailed("shell action requires a command".to_string())
    })?;
    let timeout = step
        .settings
        .timeout_ms
        .unwrap_or(ctx.defaults.build_timeout_ms);

    let dir = ctx.store.ensure_project(&ctx.project_id)?;
    let output = run_command(&dir, command, timeout, &ctx.cancel).await?;

    if output.success() {
        Ok(output.stdout)
    } else {
        Err(OrchestratorError::ExecutionFailed(format!(
            "shell command exited {}: {}",
            output.exit_code, output.stderr
        )))
    }
}

/// `checkpoint` action: pause the downstream until resolved
async fn run_checkpoint(ctx: &Arc<StepContext>, step: &ActionStep) -> Result<String> {
    let step_key = &step.instance_id;
    let spec = step.checkpoint.clone().ok_or_else(|| {
        OrchestratorError::Internal(format!("checkpoint step {} has no payload", step_key))
    })?;

    if ctx.yolo && spec.skip_in_yolo {
        info!(chat = %ctx.chat_id, checkpoint = %step_key, "skipping checkpoint (yolo)");
        return Ok("skipped (yolo)".to_string());
    }

    let checkpoint_type = serde_json::to_value(spec.checkpoint_type)?
        .as_str()
        .unwrap_or("approve")
        .to_string();
    ctx.bus.emit(PipelineEvent::PipelineCheckpoint {
        chat_id: ctx.chat_id.clone(),
        checkpoint_id: step_key.clone(),
        checkpoint_type,
        message: spec.message.clone(),
        options: spec.options.clone(),
    });

    let choice = ctx
        .checkpoints
        .wait(&ctx.chat_id, step_key, &spec, &ctx.cancel)
        .await?;

    // The committed choice is recorded as a hidden message before the
    // resolution event goes out
    MessageRepository::create(
        ctx.db.pool(),
        &ctx.chat_id,
        "system",
        &choice,
        None,
        Some(
            &json!({
                "type": "checkpoint-resolved",
                "checkpointId": step_key,
                "hidden": true
            })
            .to_string(),
        ),
    )
    .await?;

    ctx.bus.emit(PipelineEvent::PipelineCheckpointResolved {
        chat_id: ctx.chat_id.clone(),
        checkpoint_id: step_key.clone(),
        choice: choice.clone(),
    });

    Ok(choice)
}

/// Apply fix-agent output: execute its write calls and report what changed
pub(crate) async fn apply_fix_output(ctx: &StepContext, output: &str) -> Result<usize> {
    let written = tools::apply_write_calls(ctx, output).await?;
    Ok(written.len())
}
