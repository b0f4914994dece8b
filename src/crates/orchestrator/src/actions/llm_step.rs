//! Single-call LLM actions: summary, vibe-intake, mood-analysis, answer,
//! and the generic llm-call
//!
//! Each is one collected completion with a kind-specific system prompt
//! (node override wins), whose result lands in the chat as a message whose
//! `metadata.type` routes client rendering.

use crate::actions::complete_llm;
use crate::db::repositories::{MessageRepository, ProjectRepository};
use crate::events::PipelineEvent;
use crate::pipeline::StepContext;
use crate::Result;
use flow_core::resolver::ActionStep;
use flow_core::ActionKind;
use serde_json::json;
use std::sync::Arc;

const SUMMARY_PROMPT: &str = "You summarize what a multi-agent pipeline just built or changed. \
Write a short, friendly recap for the user: what was created, notable decisions, and anything \
they should check. No code blocks.";

const VIBE_PROMPT: &str = "You distill a user's request into a vibe brief. Respond with only a \
JSON object: {\"adjectives\": [string], \"metaphor\": string, \"targetUser\": string, \
\"antiReferences\": [string]}.";

const MOOD_PROMPT: &str = "You turn a vibe brief into a concrete mood analysis for designers. \
Respond with only a JSON object: {\"palette\": [string], \"typography\": string, \
\"imagery\": string, \"tone\": string}.";

const ANSWER_PROMPT: &str = "You answer questions about the user's project directly and \
concisely. Do not modify any files.";

/// Default output token cap for summaries
const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Run a single-call LLM action
pub async fn run(ctx: &Arc<StepContext>, step: &ActionStep, execution_id: &str) -> Result<String> {
    let step_key = &step.instance_id;

    let default_system = match step.kind {
        ActionKind::Summary => SUMMARY_PROMPT,
        ActionKind::VibeIntake => VIBE_PROMPT,
        ActionKind::MoodAnalysis => MOOD_PROMPT,
        ActionKind::Answer => ANSWER_PROMPT,
        _ => "",
    };
    let system = step
        .settings
        .system_prompt
        .as_deref()
        .unwrap_or(default_system);

    let max_tokens = step.settings.max_output_tokens.unwrap_or(match step.kind {
        ActionKind::Summary => SUMMARY_MAX_TOKENS,
        _ => 2048,
    });

    let prompt = build_prompt(ctx, step.kind);
    let content = complete_llm(ctx, execution_id, step_key, system, &prompt, max_tokens).await?;

    // Route the result into the chat; metadata.type drives card rendering
    let metadata = match step.kind {
        ActionKind::VibeIntake => Some(json!({"type": "vibe-brief"}).to_string()),
        ActionKind::MoodAnalysis => Some(json!({"type": "mood-analysis"}).to_string()),
        ActionKind::Summary | ActionKind::Answer => None,
        _ => Some(json!({"type": "agent-output", "hidden": true}).to_string()),
    };

    let message = MessageRepository::create(
        ctx.db.pool(),
        &ctx.chat_id,
        "assistant",
        &content,
        Some(step_key),
        metadata.as_deref(),
    )
    .await?;
    ctx.bus.emit(PipelineEvent::ChatMessage {
        chat_id: ctx.chat_id.clone(),
        message: serde_json::to_value(&message)?,
    });

    // The vibe brief also persists onto the project for later runs
    if step.kind == ActionKind::VibeIntake {
        ProjectRepository::set_vibe_brief(ctx.db.pool(), &ctx.project_id, &content).await?;
    }

    Ok(content)
}

/// Kind-specific prompt over the user message and prior outputs
fn build_prompt(ctx: &StepContext, kind: ActionKind) -> String {
    match kind {
        ActionKind::Summary => {
            let completed = ctx.results.keys();
            let mut steps: Vec<String> = completed.into_iter().collect();
            steps.sort();
            format!(
                "Original request: {}\nCompleted steps: {}\nWrite the summary.",
                ctx.user_message,
                steps.join(", ")
            )
        }
        ActionKind::MoodAnalysis => {
            let brief = ctx
                .results
                .get("vibe-intake")
                .unwrap_or_else(|| "(no vibe brief)".to_string());
            format!("Vibe brief:\n{}\n\nRequest: {}", brief, ctx.user_message)
        }
        ActionKind::Answer => {
            let source = ctx.store.serialize_source(&ctx.project_id);
            if source.is_empty() {
                ctx.user_message.clone()
            } else {
                format!("Project source:\n{}\nQuestion: {}", source, ctx.user_message)
            }
        }
        _ => ctx.user_message.clone(),
    }
}
