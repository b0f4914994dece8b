//! Streaming tool-call extraction.
//!
//! Tool calls are embedded in assistant output as `<tool_call>...</tool_call>`
//! JSON blocks. Chunks arrive at arbitrary boundaries, so the scanner is a
//! small state machine over a carry buffer rather than a regex over the
//! accumulated text: a tag split across two chunks must still be recognized,
//! and plain text must flow through with minimal latency.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OPEN_TAG: &str = "<tool_call>";
const CLOSE_TAG: &str = "</tool_call>";

/// A parsed tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    /// Tool name (`write_file`, `read_file`, ...).
    #[serde(rename = "tool")]
    pub name: String,

    /// Tool arguments.
    #[serde(default)]
    pub args: Value,
}

/// Parse the JSON body of a tool-call block.
pub fn parse_tool_call(raw: &str) -> Result<ToolCallRequest> {
    serde_json::from_str(raw.trim())
        .map_err(|e| LlmError::InvalidResponse(format!("malformed tool call: {}", e)))
}

/// One event produced by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Plain assistant text.
    Text(String),
    /// Raw JSON body of a complete tool-call block.
    ToolCall(String),
}

/// Incremental scanner for `<tool_call>` blocks.
#[derive(Debug, Default)]
pub struct ToolCallScanner {
    buffer: String,
    in_tool_call: bool,
}

impl ToolCallScanner {
    /// Create a fresh scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the events it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<ScanEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            if self.in_tool_call {
                match self.buffer.find(CLOSE_TAG) {
                    Some(idx) => {
                        let body: String = self.buffer.drain(..idx).collect();
                        self.buffer.drain(..CLOSE_TAG.len());
                        self.in_tool_call = false;
                        events.push(ScanEvent::ToolCall(body.trim().to_string()));
                    }
                    // Body still streaming; hold everything
                    None => break,
                }
            } else {
                match self.buffer.find(OPEN_TAG) {
                    Some(idx) => {
                        if idx > 0 {
                            let text: String = self.buffer.drain(..idx).collect();
                            events.push(ScanEvent::Text(text));
                        }
                        self.buffer.drain(..OPEN_TAG.len());
                        self.in_tool_call = true;
                    }
                    None => {
                        // Emit all but a tail that could still become an
                        // open tag once the next chunk arrives
                        let keep = partial_tag_suffix(&self.buffer, OPEN_TAG);
                        let emit_len = self.buffer.len() - keep;
                        if emit_len > 0 {
                            let text: String = self.buffer.drain(..emit_len).collect();
                            events.push(ScanEvent::Text(text));
                        }
                        break;
                    }
                }
            }
        }

        events
    }

    /// Flush at end of stream.
    ///
    /// An unterminated tool-call block is surfaced as text (tag restored) so
    /// no model output is silently dropped.
    pub fn finish(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        if self.in_tool_call {
            let mut text = String::from(OPEN_TAG);
            text.push_str(&self.buffer);
            self.buffer.clear();
            self.in_tool_call = false;
            events.push(ScanEvent::Text(text));
        } else if !self.buffer.is_empty() {
            events.push(ScanEvent::Text(std::mem::take(&mut self.buffer)));
        }
        events
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `tag`.
fn partial_tag_suffix(s: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(s.len());
    for len in (1..=max).rev() {
        if s.ends_with(&tag[..len]) {
            return len;
        }
    }
    0
}
