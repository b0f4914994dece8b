//! Build-check action
//!
//! Runs the configured build command; on failure, deduplicated error
//! signatures plus the current project source go to a scoped fix agent,
//! its write calls are applied, and the build re-runs, up to the attempt
//! cap. Success emits `preview_ready`.

use crate::actions::{apply_fix_output, complete_llm};
use crate::artifacts::run_command;
use crate::events::PipelineEvent;
use crate::pipeline::StepContext;
use crate::{OrchestratorError, Result};
use flow_core::resolver::ActionStep;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_BUILD_COMMAND: &str = "npm run build";

const FIX_SYSTEM_PROMPT: &str = "You fix build errors in a generated web project. Respond with \
write_file tool calls (<tool_call>{\"tool\":\"write_file\",\"args\":{\"path\":...,\"content\":...}}</tool_call>) \
containing the corrected files. Rewrite whole files; do not output diffs.";

/// Collapse build output into unique error signatures
///
/// Lines matching the error pattern are normalized (whitespace collapsed)
/// and deduplicated in order, capped so a pathological build cannot flood
/// the fix prompt.
pub fn unique_error_signatures(output: &str, cap: usize) -> Vec<String> {
    static ERROR_LINE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let pattern = ERROR_LINE
        .get_or_init(|| regex::Regex::new(r"(?i)\berror\b|failed to compile").expect("static regex"));

    let mut seen = std::collections::HashSet::new();
    let mut signatures = Vec::new();

    for line in output.lines() {
        if !pattern.is_match(line) {
            continue;
        }
        let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        signatures.push(normalized);
        if signatures.len() >= cap {
            break;
        }
    }

    signatures
}

/// Run the build-check loop
pub async fn run(ctx: &Arc<StepContext>, step: &ActionStep, execution_id: &str) -> Result<String> {
    let step_key = &step.instance_id;
    let command = step
        .settings
        .command
        .as_deref()
        .unwrap_or(DEFAULT_BUILD_COMMAND);
    let timeout = step
        .settings
        .timeout_ms
        .unwrap_or(ctx.defaults.build_timeout_ms);
    let max_attempts = step
        .settings
        .max_attempts
        .unwrap_or(ctx.defaults.max_build_fix_attempts)
        .max(1);

    let dir = ctx.store.ensure_project(&ctx.project_id)?;

    for attempt in 1..=max_attempts {
        let output = run_command(&dir, command, timeout, &ctx.cancel).await?;

        if output.success() {
            info!(chat = %ctx.chat_id, attempt, "build succeeded");
            ctx.bus.emit(PipelineEvent::PreviewReady {
                chat_id: ctx.chat_id.clone(),
                project_id: ctx.project_id.clone(),
            });
            return Ok(format!("build succeeded after {} attempt(s)", attempt));
        }

        let combined = format!("{}\n{}", output.stderr, output.stdout);
        let signatures =
            unique_error_signatures(&combined, ctx.defaults.max_unique_errors as usize);
        warn!(
            chat = %ctx.chat_id,
            attempt,
            errors = signatures.len(),
            "build failed"
        );
        ctx.bus.emit(PipelineEvent::AgentStream {
            chat_id: ctx.chat_id.clone(),
            agent: step_key.clone(),
            event: "build_failed".to_string(),
            detail: Some(format!("attempt {}: {} unique errors", attempt, signatures.len())),
        });

        if attempt == max_attempts {
            break;
        }

        let prompt = format!(
            "The build command `{}` failed with these errors:\n{}\n\nProject source:\n{}",
            command,
            signatures.join("\n"),
            ctx.store.serialize_source(&ctx.project_id)
        );
        let fix_output =
            complete_llm(ctx, execution_id, step_key, FIX_SYSTEM_PROMPT, &prompt, 8192).await?;
        let files_fixed = apply_fix_output(ctx, &fix_output).await?;
        info!(chat = %ctx.chat_id, attempt, files_fixed, "applied build fixes");
    }

    Err(OrchestratorError::ExecutionFailed(format!(
        "build still failing after {} attempts",
        max_attempts
    )))
}
