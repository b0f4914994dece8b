//! Agent step execution
//!
//! Runs one agent step end to end: assemble the prompt from upstream
//! sources, stream the completion while routing embedded tool calls, and
//! persist the execution, output, and token usage. Event ordering is part
//! of the contract: `agent_status(running)` precedes any `agent_thinking`,
//! and the terminal `agent_status` is the step's last event.

use crate::agents::tools;
use crate::db::repositories::{ExecutionRepository, MessageRepository, ProjectRepository};
use crate::events::{AgentStatus, PipelineEvent};
use crate::pipeline::retry::{retry_with_backoff, RetryConfig};
use crate::pipeline::StepContext;
use crate::{OrchestratorError, Result};
use flow_core::resolver::AgentStep;
use flow_core::SourceTransform;
use futures::StreamExt;
use llm::{ChatMessage, CompletionRequest, ScanEvent, StreamChunk, TokenCounts, ToolCallScanner};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Resolve one upstream source to its labeled prompt value
async fn lookup_source(
    ctx: &StepContext,
    source: &flow_core::UpstreamSource,
) -> Result<Option<String>> {
    // Node-id results win over well-known keys of the same name
    if let Some(value) = ctx.results.get(&source.source_key) {
        return Ok(Some(value));
    }

    match source.source_key.as_str() {
        "vibe-brief" => {
            let project = ProjectRepository::get_by_id(ctx.db.pool(), &ctx.project_id).await?;
            Ok(project.and_then(|p| p.vibe_brief))
        }
        "mood-analysis" => Ok(ctx.results.get("mood-analysis")),
        // Always read fresh from disk; upstream steps may have written since
        "project-source" => Ok(Some(ctx.store.serialize_source(&ctx.project_id))),
        _ => Ok(None),
    }
}

/// Apply a source transform to a raw upstream value
fn apply_transform(
    store: &crate::artifacts::ArtifactStore,
    project_id: &str,
    transform: SourceTransform,
    value: &str,
) -> String {
    match transform {
        SourceTransform::Raw => value.to_string(),
        SourceTransform::DesignSystem => {
            // Architect output is JSON with a design_system field; fall back
            // to the raw value when it is not
            let parsed: Option<serde_json::Value> = value
                .find('{')
                .and_then(|start| serde_json::from_str(&value[start..]).ok());
            parsed
                .as_ref()
                .and_then(|v| v.get("design_system"))
                .map(|ds| serde_json::to_string_pretty(ds).unwrap_or_default())
                .unwrap_or_else(|| value.to_string())
        }
        SourceTransform::FileManifest => {
            let paths = tools::written_paths(value);
            if paths.is_empty() {
                "(no files written)".to_string()
            } else {
                paths.join("\n")
            }
        }
        SourceTransform::ProjectSource => store.serialize_source(project_id),
    }
}

/// Assemble the "Previous Agent Outputs" block prepended to the rendered
/// input template
async fn assemble_upstream(ctx: &StepContext, step: &AgentStep) -> Result<String> {
    let mut block = String::new();

    for source in &step.upstream_sources {
        let Some(value) = lookup_source(ctx, source).await? else {
            debug!(
                agent = %step.instance_id,
                source = %source.source_key,
                "upstream source has no value"
            );
            continue;
        };
        let label = source.alias.as_deref().unwrap_or(&source.source_key);
        let transformed = apply_transform(&ctx.store, &ctx.project_id, source.transform, &value);
        block.push_str(&format!("### {}\n{}\n\n", label, transformed));
    }

    if block.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("## Previous Agent Outputs\n\n{}", block))
    }
}

/// One streaming attempt; returns the full raw output and merged usage
async fn stream_once(
    ctx: &Arc<StepContext>,
    step_key: &str,
    prompt: &str,
    system: &str,
    max_tokens: u32,
    max_tool_steps: u32,
    timeout_ms: u64,
) -> Result<(String, TokenCounts)> {
    let request = CompletionRequest::new(vec![ChatMessage::user(prompt.to_string())])
        .with_system(system.to_string())
        .with_max_tokens(max_tokens);

    let mut stream = ctx.provider.stream_chat(request).await?;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let mut scanner = ToolCallScanner::new();
    let mut full_output = String::new();
    let mut usage = TokenCounts::default();
    let mut tool_steps = 0u32;

    loop {
        let chunk = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(OrchestratorError::StepTimeout(timeout_ms));
            }
            chunk = stream.next() => chunk,
        };

        let chunk = match chunk {
            None => break,
            Some(chunk) => chunk?,
        };

        match chunk {
            StreamChunk::TextDelta(text) => {
                full_output.push_str(&text);
                for event in scanner.push(&text) {
                    handle_scan_event(ctx, step_key, event, &mut tool_steps, max_tool_steps).await;
                }
            }
            StreamChunk::Usage(frame) => usage.merge(&frame),
            StreamChunk::Done { .. } => break,
        }
    }

    for event in scanner.finish() {
        handle_scan_event(ctx, step_key, event, &mut tool_steps, max_tool_steps).await;
    }

    Ok((full_output, usage))
}

/// Route one scanner event: thinking text out to clients, tool calls to the
/// store. Tool failures are step-local: they emit an error notice and the
/// stream continues.
async fn handle_scan_event(
    ctx: &Arc<StepContext>,
    step_key: &str,
    event: ScanEvent,
    tool_steps: &mut u32,
    max_tool_steps: u32,
) {
    match event {
        ScanEvent::Text(text) => {
            if !text.is_empty() {
                ctx.bus.emit(PipelineEvent::AgentThinking {
                    chat_id: ctx.chat_id.clone(),
                    agent: step_key.to_string(),
                    chunk: text,
                });
            }
        }
        ScanEvent::ToolCall(raw) => {
            *tool_steps += 1;
            if *tool_steps > max_tool_steps {
                warn!(agent = step_key, "tool step cap reached, skipping call");
                ctx.bus.emit(PipelineEvent::AgentStream {
                    chat_id: ctx.chat_id.clone(),
                    agent: step_key.to_string(),
                    event: "tool_skipped".to_string(),
                    detail: Some(format!("tool step cap {} reached", max_tool_steps)),
                });
                return;
            }

            let outcome = match llm::parse_tool_call(&raw) {
                Ok(call) => {
                    ctx.bus.emit(PipelineEvent::AgentStream {
                        chat_id: ctx.chat_id.clone(),
                        agent: step_key.to_string(),
                        event: "tool_started".to_string(),
                        detail: Some(call.name.clone()),
                    });
                    tools::execute_tool(ctx, &call).await
                }
                Err(e) => Err(OrchestratorError::ToolError(e.to_string())),
            };

            match outcome {
                Ok(summary) => ctx.bus.emit(PipelineEvent::AgentStream {
                    chat_id: ctx.chat_id.clone(),
                    agent: step_key.to_string(),
                    event: "tool_completed".to_string(),
                    detail: Some(summary),
                }),
                Err(e) => ctx.bus.emit(PipelineEvent::AgentStream {
                    chat_id: ctx.chat_id.clone(),
                    agent: step_key.to_string(),
                    event: "tool_error".to_string(),
                    detail: Some(e.to_string()),
                }),
            }
        }
    }
}

/// Execute one agent step
pub async fn run_agent_step(ctx: &Arc<StepContext>, step: &AgentStep) -> Result<()> {
    let step_key = step.instance_id.clone();

    let upstream = assemble_upstream(ctx, step).await?;
    let prompt = if upstream.is_empty() {
        step.input.clone()
    } else {
        format!("{}{}", upstream, step.input)
    };

    let system = ctx.system_prompt(
        crate::agents::system_prompt_for(&step.agent_name),
        step.system_prompt.as_deref(),
    );
    let max_tokens = step
        .max_output_tokens
        .unwrap_or(ctx.defaults.default_max_output_tokens);
    let max_tool_steps = step
        .max_tool_steps
        .unwrap_or(ctx.defaults.default_max_tool_steps);
    let timeout_ms = ctx.defaults.agent_timeout_ms(max_tokens);

    let execution = ExecutionRepository::start(
        ctx.db.pool(),
        &ctx.chat_id,
        &step_key,
        Some(&json!({ "prompt": prompt, "agent": step.agent_name }).to_string()),
    )
    .await?;
    ctx.emit_status(&step_key, AgentStatus::Running);

    let retry_config = RetryConfig::new(
        ctx.defaults.max_agent_retries,
        ctx.defaults.retry_initial_backoff_ms,
    );

    let attempt_ctx = ctx.clone();
    let attempt_key = step_key.clone();
    let attempt_prompt = prompt.clone();
    let attempt_system = system.clone();
    let retry_db = ctx.db.clone();
    let retry_execution_id = execution.id.clone();
    let retry_notify_ctx = ctx.clone();
    let retry_key = step_key.clone();

    let outcome = retry_with_backoff(
        &retry_config,
        &step_key,
        &ctx.cancel,
        move || {
            let ctx = attempt_ctx.clone();
            let key = attempt_key.clone();
            let prompt = attempt_prompt.clone();
            let system = attempt_system.clone();
            async move {
                stream_once(&ctx, &key, &prompt, &system, max_tokens, max_tool_steps, timeout_ms)
                    .await
            }
        },
        move |_attempt| {
            let db = retry_db.clone();
            let execution_id = retry_execution_id.clone();
            let ctx = retry_notify_ctx.clone();
            let key = retry_key.clone();
            async move {
                let _ = ExecutionRepository::mark_retrying(db.pool(), &execution_id).await;
                ctx.emit_status(&key, AgentStatus::Retrying);
                let _ = ExecutionRepository::mark_running(db.pool(), &execution_id).await;
            }
        },
    )
    .await;

    match outcome {
        Ok((content, usage)) => {
            ctx.results.insert(&step_key, content.clone());
            ExecutionRepository::complete(
                ctx.db.pool(),
                &execution.id,
                &json!({ "content": content }).to_string(),
            )
            .await?;

            // Raw agent output is hidden from the plain chat stream
            let message = MessageRepository::create(
                ctx.db.pool(),
                &ctx.chat_id,
                "assistant",
                &content,
                Some(&step.agent_name),
                Some(r#"{"type":"agent-output","hidden":true}"#),
            )
            .await?;
            ctx.bus.emit(PipelineEvent::ChatMessage {
                chat_id: ctx.chat_id.clone(),
                message: serde_json::to_value(&message)?,
            });

            // Budget breach interrupts the pipeline, but the step itself
            // completed: terminal status goes out either way
            let budget_verdict = ctx.record_usage(Some(&execution.id), &step_key, &usage).await;
            ctx.emit_status(&step_key, AgentStatus::Completed);
            budget_verdict
        }
        Err(OrchestratorError::Cancelled) => {
            ExecutionRepository::stop_in_flight(ctx.db.pool(), &ctx.chat_id).await?;
            Err(OrchestratorError::Cancelled)
        }
        Err(e) => {
            // The error is recorded before any event is emitted for it
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_design_system_transform_extracts_field() {
        let (_dir, store) = store();
        let value = r##"Here is the plan: {"design_system":{"primary":"#112233"},"pages":[]}"##;
        let extracted = apply_transform(&store, "p1", SourceTransform::DesignSystem, value);
        assert!(extracted.contains("#112233"));
        assert!(!extracted.contains("pages"));
    }

    #[test]
    fn test_design_system_transform_falls_back_to_raw() {
        let (_dir, store) = store();
        let value = "not json at all";
        assert_eq!(
            apply_transform(&store, "p1", SourceTransform::DesignSystem, value),
            value
        );
    }

    #[test]
    fn test_file_manifest_transform() {
        let (_dir, store) = store();
        let value = r#"<tool_call>{"tool":"write_file","args":{"path":"app.js","content":""}}</tool_call>"#;
        assert_eq!(
            apply_transform(&store, "p1", SourceTransform::FileManifest, value),
            "app.js"
        );
    }

    #[test]
    fn test_project_source_transform_reads_tree() {
        let (_dir, store) = store();
        store.write("p1", "index.html", "<h1>hi</h1>").unwrap();
        let rendered = apply_transform(&store, "p1", SourceTransform::ProjectSource, "ignored");
        assert!(rendered.contains("=== index.html ==="));
    }
}
