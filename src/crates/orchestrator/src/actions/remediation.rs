//! Remediation action
//!
//! Scans the configured reviewers' outputs for issue lists; while any remain,
//! the consolidated set goes to the configured fix agents (or the default
//! frontend fixer), their write calls are applied, and the same reviewers
//! re-run over the fresh project source. Exhausting the cycle cap is an
//! outcome, not a failure.

use crate::actions::{apply_fix_output, complete_llm};
use crate::agents;
use crate::pipeline::StepContext;
use crate::Result;
use flow_core::resolver::ActionStep;
use std::sync::Arc;
use tracing::{debug, info};

const FIX_SYSTEM_PROMPT: &str = "You fix reviewer findings in a generated web project. Respond \
with write_file tool calls containing corrected files. Address every listed issue.";

const CLEAN_MARKER: &str = "ISSUES: none";

/// Extract issue bullet points from a reviewer's output
pub fn extract_issues(output: &str) -> Vec<String> {
    if output.contains(CLEAN_MARKER) {
        return Vec::new();
    }
    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| {
            line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ")
        })
        .map(|line| line[2..].trim().to_string())
        .filter(|issue| !issue.is_empty())
        .collect()
}

/// Consolidate issues across reviewers, labeled by reviewer key
fn collect_issues(ctx: &StepContext, reviewer_keys: &[String]) -> Vec<String> {
    let mut all = Vec::new();
    for key in reviewer_keys {
        let Some(output) = ctx.results.get(key) else {
            debug!(reviewer = %key, "reviewer has no output yet");
            continue;
        };
        for issue in extract_issues(&output) {
            all.push(format!("[{}] {}", key, issue));
        }
    }
    all
}

/// Run the remediation loop
pub async fn run(ctx: &Arc<StepContext>, step: &ActionStep, execution_id: &str) -> Result<String> {
    let step_key = &step.instance_id;
    let reviewer_keys = &step.settings.remediation_reviewer_keys;
    let max_cycles = step
        .settings
        .max_attempts
        .unwrap_or(ctx.defaults.max_remediation_cycles)
        .max(1);

    if reviewer_keys.is_empty() {
        return Ok("no reviewers configured".to_string());
    }

    let fix_agents: Vec<String> = if step.settings.remediation_fix_agents.is_empty() {
        vec!["frontend-dev".to_string()]
    } else {
        step.settings.remediation_fix_agents.clone()
    };

    for cycle in 1..=max_cycles {
        let issues = collect_issues(ctx, reviewer_keys);
        if issues.is_empty() {
            info!(chat = %ctx.chat_id, cycle, "reviews clean");
            return Ok(format!("reviews clean after {} cycle(s)", cycle));
        }

        info!(chat = %ctx.chat_id, cycle, issues = issues.len(), "remediating");

        let issue_block = issues.join("\n");
        for fix_agent in &fix_agents {
            let prompt = format!(
                "Reviewers found these issues:\n{}\n\nProject source:\n{}",
                issue_block,
                ctx.store.serialize_source(&ctx.project_id)
            );
            let system = agents::system_prompt_for(fix_agent).unwrap_or(FIX_SYSTEM_PROMPT);
            let fix_output = complete_llm(
                ctx,
                execution_id,
                step_key,
                &format!("{}\n\n{}", system, FIX_SYSTEM_PROMPT),
                &prompt,
                8192,
            )
            .await?;
            apply_fix_output(ctx, &fix_output).await?;
        }

        // Re-run the same reviewers over the fresh tree so the next cycle
        // sees current findings
        for reviewer_key in reviewer_keys {
            let role = agents::system_prompt_for(reviewer_key)
                .unwrap_or("You are a code reviewer. List concrete issues as bullet points, or reply ISSUES: none.");
            let prompt = format!(
                "Review this project:\n{}",
                ctx.store.serialize_source(&ctx.project_id)
            );
            let review = complete_llm(ctx, execution_id, reviewer_key, role, &prompt, 4096).await?;
            ctx.results.insert(reviewer_key, review);
        }
    }

    let outstanding = collect_issues(ctx, reviewer_keys);
    if outstanding.is_empty() {
        Ok(format!("reviews clean after {} cycle(s)", max_cycles))
    } else {
        Ok(format!(
            "remediation ended with {} outstanding issue(s) after {} cycle(s)",
            outstanding.len(),
            max_cycles
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bulleted_issues() {
        let output = "Findings:\n- missing alt text\n* inline styles in hero\nnot a bullet";
        let issues = extract_issues(output);
        assert_eq!(issues, vec!["missing alt text", "inline styles in hero"]);
    }

    #[test]
    fn test_clean_marker_short_circuits() {
        let output = "ISSUES: none\n- this bullet is decorative";
        assert!(extract_issues(output).is_empty());
    }

    #[test]
    fn test_empty_output_has_no_issues() {
        assert!(extract_issues("").is_empty());
    }
}
