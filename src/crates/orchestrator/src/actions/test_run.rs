//! Test-run action
//!
//! Runs the test command, parses structured results out of its output,
//! streams them incrementally, and loops a fix agent over failures up to
//! the attempt cap or the failing-test ceiling.

use crate::actions::{apply_fix_output, complete_llm};
use crate::artifacts::run_command;
use crate::events::{PipelineEvent, TestResult};
use crate::pipeline::StepContext;
use crate::{OrchestratorError, Result};
use flow_core::resolver::ActionStep;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_TEST_COMMAND: &str = "npm test";

const FIX_SYSTEM_PROMPT: &str = "You fix failing tests in a generated web project. Respond with \
write_file tool calls containing corrected files. Fix the code under test unless the test \
itself is clearly wrong.";

/// Parse test runner output into structured results
///
/// Understands the common line shapes: `PASS`/`FAIL` prefixes, `✓`/`✗`
/// markers, and TAP `ok`/`not ok`.
pub fn parse_test_output(output: &str) -> Vec<TestResult> {
    let mut results = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        let (passed, rest) = if let Some(rest) = line.strip_prefix("PASS ") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("FAIL ") {
            (false, rest)
        } else if let Some(rest) = line.strip_prefix("✓ ") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("✗ ") {
            (false, rest)
        } else if let Some(rest) = line.strip_prefix("not ok ") {
            (false, rest.trim_start_matches(|c: char| c.is_ascii_digit() || c == ' ' || c == '-'))
        } else if let Some(rest) = line.strip_prefix("ok ") {
            (true, rest.trim_start_matches(|c: char| c.is_ascii_digit() || c == ' ' || c == '-'))
        } else {
            continue;
        };

        let name = rest.trim();
        if name.is_empty() {
            continue;
        }
        results.push(TestResult {
            name: name.to_string(),
            passed,
            message: if passed { None } else { Some(line.to_string()) },
        });
    }

    results
}

/// Run the test-run loop
pub async fn run(ctx: &Arc<StepContext>, step: &ActionStep, execution_id: &str) -> Result<String> {
    let step_key = &step.instance_id;
    let command = step
        .settings
        .command
        .as_deref()
        .unwrap_or(DEFAULT_TEST_COMMAND);
    let timeout = step
        .settings
        .timeout_ms
        .unwrap_or(ctx.defaults.test_timeout_ms);
    let max_attempts = step
        .settings
        .max_attempts
        .unwrap_or(ctx.defaults.max_build_fix_attempts)
        .max(1);
    let max_failures = ctx.defaults.max_test_failures as usize;

    let dir = ctx.store.ensure_project(&ctx.project_id)?;

    for attempt in 1..=max_attempts {
        let output = run_command(&dir, command, timeout, &ctx.cancel).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let results = parse_test_output(&combined);

        for result in &results {
            ctx.bus.emit(PipelineEvent::TestResultIncremental {
                chat_id: ctx.chat_id.clone(),
                result: result.clone(),
            });
        }

        let failed: Vec<&TestResult> = results.iter().filter(|r| !r.passed).collect();
        let passed = results.len() - failed.len();
        ctx.bus.emit(PipelineEvent::TestResults {
            chat_id: ctx.chat_id.clone(),
            passed: passed as u32,
            failed: failed.len() as u32,
            results: results.clone(),
        });

        if failed.is_empty() && output.success() {
            info!(chat = %ctx.chat_id, attempt, passed, "tests passed");
            return Ok(format!("{} tests passed after {} attempt(s)", passed, attempt));
        }

        warn!(chat = %ctx.chat_id, attempt, failed = failed.len(), "tests failed");

        if failed.len() > max_failures {
            return Err(OrchestratorError::ExecutionFailed(format!(
                "{} failing tests exceeds the cap of {}",
                failed.len(),
                max_failures
            )));
        }
        if attempt == max_attempts {
            break;
        }

        let failures_block: String = failed
            .iter()
            .map(|r| format!("- {}: {}\n", r.name, r.message.as_deref().unwrap_or("failed")))
            .collect();
        let prompt = format!(
            "The test command `{}` reported failures:\n{}\nProject source:\n{}",
            command,
            failures_block,
            ctx.store.serialize_source(&ctx.project_id)
        );
        let fix_output =
            complete_llm(ctx, execution_id, step_key, FIX_SYSTEM_PROMPT, &prompt, 8192).await?;
        apply_fix_output(ctx, &fix_output).await?;
    }

    Err(OrchestratorError::ExecutionFailed(format!(
        "tests still failing after {} attempts",
        max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pass_fail_prefixes() {
        let output = "PASS renders hero\nFAIL submits form\nrandom noise";
        let results = parse_test_output(output);
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].name, "submits form");
        assert!(results[1].message.is_some());
    }

    #[test]
    fn test_parse_tap_lines() {
        let output = "ok 1 - loads page\nnot ok 2 - saves data";
        let results = parse_test_output(output);
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert_eq!(results[0].name, "loads page");
        assert!(!results[1].passed);
        assert_eq!(results[1].name, "saves data");
    }

    #[test]
    fn test_parse_check_marks() {
        let output = "✓ hero visible\n✗ cta clickable";
        let results = parse_test_output(output);
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_test_output("").is_empty());
    }
}
