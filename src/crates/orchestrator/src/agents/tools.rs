//! Tool-call routing for agent streams
//!
//! Tool calls parsed out of the assistant stream land here. Built-in tools
//! touch the artifact store and the snapshot table; anything else is a tool
//! error that the agent stream survives.

use crate::db::repositories::SnapshotRepository;
use crate::events::PipelineEvent;
use crate::pipeline::StepContext;
use crate::{OrchestratorError, Result};
use llm::{parse_tool_call, ScanEvent, ToolCallRequest, ToolCallScanner};
use tracing::debug;

/// Execute one tool call and return a short result summary
pub async fn execute_tool(ctx: &StepContext, call: &ToolCallRequest) -> Result<String> {
    match call.name.as_str() {
        "write_file" => {
            let path = required_str(call, "path")?;
            let content = required_str(call, "content")?;
            ctx.store.write(&ctx.project_id, path, content)?;
            ctx.bus.emit(PipelineEvent::FilesChanged {
                chat_id: ctx.chat_id.clone(),
                project_id: ctx.project_id.clone(),
                paths: vec![path.to_string()],
            });
            Ok(format!("wrote {}", path))
        }
        "write_files" => {
            let files = call.args["files"].as_array().ok_or_else(|| {
                OrchestratorError::ToolError("write_files requires a files array".to_string())
            })?;
            let mut paths = Vec::new();
            for file in files {
                let path = file["path"].as_str().ok_or_else(|| {
                    OrchestratorError::ToolError("file entry missing path".to_string())
                })?;
                let content = file["content"].as_str().unwrap_or_default();
                ctx.store.write(&ctx.project_id, path, content)?;
                paths.push(path.to_string());
            }
            ctx.bus.emit(PipelineEvent::FilesChanged {
                chat_id: ctx.chat_id.clone(),
                project_id: ctx.project_id.clone(),
                paths: paths.clone(),
            });
            Ok(format!("wrote {} files", paths.len()))
        }
        "read_file" => {
            let path = required_str(call, "path")?;
            ctx.store.read(&ctx.project_id, path).map_err(|e| {
                OrchestratorError::ToolError(format!("read_file {}: {}", path, e))
            })
        }
        "list_files" => {
            let paths: Vec<String> = ctx
                .store
                .list_tree(&ctx.project_id)
                .into_iter()
                .map(|e| e.path)
                .collect();
            Ok(paths.join("\n"))
        }
        "save_version" => {
            let label = call.args["label"].as_str().unwrap_or("checkpoint");
            let manifest = ctx.store.manifest(&ctx.project_id)?;
            SnapshotRepository::create(
                ctx.db.pool(),
                &ctx.project_id,
                &ctx.chat_id,
                label,
                &manifest.to_string(),
            )
            .await?;
            ctx.bus.emit(PipelineEvent::FilesChanged {
                chat_id: ctx.chat_id.clone(),
                project_id: ctx.project_id.clone(),
                paths: vec!["__snapshot__".to_string()],
            });
            Ok(format!("saved version '{}'", label))
        }
        other => Err(OrchestratorError::ToolError(format!(
            "unknown tool '{}'",
            other
        ))),
    }
}

fn required_str<'a>(call: &'a ToolCallRequest, field: &str) -> Result<&'a str> {
    call.args[field].as_str().ok_or_else(|| {
        OrchestratorError::ToolError(format!("{} requires string field '{}'", call.name, field))
    })
}

/// Paths written by `write_file`/`write_files` calls embedded in output text
///
/// This backs the `file-manifest` upstream transform: persisted agent output
/// retains its tool-call blocks, so the manifest can be scraped back out.
pub fn written_paths(content: &str) -> Vec<String> {
    let mut scanner = ToolCallScanner::new();
    let mut events = scanner.push(content);
    events.extend(scanner.finish());

    let mut paths = Vec::new();
    for event in events {
        let ScanEvent::ToolCall(raw) = event else {
            continue;
        };
        let Ok(call) = parse_tool_call(&raw) else {
            continue;
        };
        match call.name.as_str() {
            "write_file" => {
                if let Some(path) = call.args["path"].as_str() {
                    paths.push(path.to_string());
                }
            }
            "write_files" => {
                if let Some(files) = call.args["files"].as_array() {
                    for file in files {
                        if let Some(path) = file["path"].as_str() {
                            paths.push(path.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    paths
}

/// Apply the write calls embedded in a fix agent's collected output
///
/// Fix loops get complete (non-streamed) completions back; this extracts
/// and executes just the file writes, returning the touched paths.
pub async fn apply_write_calls(ctx: &StepContext, content: &str) -> Result<Vec<String>> {
    let mut scanner = ToolCallScanner::new();
    let mut events = scanner.push(content);
    events.extend(scanner.finish());

    let mut written = Vec::new();
    for event in events {
        let ScanEvent::ToolCall(raw) = event else {
            continue;
        };
        let call = match parse_tool_call(&raw) {
            Ok(call) => call,
            Err(e) => {
                debug!(error = %e, "skipping malformed tool call in fix output");
                continue;
            }
        };
        if matches!(call.name.as_str(), "write_file" | "write_files") {
            execute_tool(ctx, &call).await?;
            written.extend(written_paths(&format!(
                "<tool_call>{}</tool_call>",
                raw
            )));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_paths_single() {
        let content = r#"Building now.
<tool_call>{"tool":"write_file","args":{"path":"index.html","content":"<html/>"}}</tool_call>
Done."#;
        assert_eq!(written_paths(content), vec!["index.html"]);
    }

    #[test]
    fn test_written_paths_batch() {
        let content = r#"<tool_call>{"tool":"write_files","args":{"files":[
            {"path":"a.css","content":""},{"path":"b.js","content":""}]}}</tool_call>"#;
        assert_eq!(written_paths(content), vec!["a.css", "b.js"]);
    }

    #[test]
    fn test_written_paths_ignores_reads() {
        let content =
            r#"<tool_call>{"tool":"read_file","args":{"path":"index.html"}}</tool_call>"#;
        assert!(written_paths(content).is_empty());
    }
}
