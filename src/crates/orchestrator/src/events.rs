//! Typed pipeline events and the in-process event bus
//!
//! Every server-to-client frame is a `{type, payload}` JSON object and every
//! payload carries `chatId`; WebSocket subscribers receive only events whose
//! chat matches theirs. Fan-out is FIFO per subscriber over a broadcast
//! channel, and the server never coalesces frames because per-type ordering
//! is part of the contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Agent/step status values carried on `agent_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Step queued but not yet dispatched
    Pending,
    /// Step executing
    Running,
    /// Step finished successfully
    Completed,
    /// Step failed
    Failed,
    /// Transient failure, retry scheduled
    Retrying,
    /// Step cancelled by user stop
    Stopped,
}

/// One incremental test result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// Failure message when it did not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Real-time pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PipelineEvent {
    /// Step status transition
    #[serde(rename = "agent_status", rename_all = "camelCase")]
    AgentStatus {
        chat_id: String,
        agent: String,
        status: AgentStatus,
    },

    /// Incremental assistant text for a step
    #[serde(rename = "agent_thinking", rename_all = "camelCase")]
    AgentThinking {
        chat_id: String,
        agent: String,
        chunk: String,
    },

    /// Step-level progress notice (tool executions, fix-loop attempts)
    #[serde(rename = "agent_stream", rename_all = "camelCase")]
    AgentStream {
        chat_id: String,
        agent: String,
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// Step error surfaced to the client
    #[serde(rename = "agent_error", rename_all = "camelCase")]
    AgentError {
        chat_id: String,
        agent: String,
        error: String,
    },

    /// A chat message row was written
    #[serde(rename = "chat_message", rename_all = "camelCase")]
    ChatMessage { chat_id: String, message: Value },

    /// Chat title changed
    #[serde(rename = "chat_renamed", rename_all = "camelCase")]
    ChatRenamed { chat_id: String, title: String },

    /// Token usage recorded for a step
    #[serde(rename = "token_usage", rename_all = "camelCase")]
    TokenUsage {
        chat_id: String,
        agent: String,
        input_tokens: u64,
        output_tokens: u64,
        cost_estimate: f64,
    },

    /// Project files were written
    #[serde(rename = "files_changed", rename_all = "camelCase")]
    FilesChanged {
        chat_id: String,
        project_id: String,
        paths: Vec<String>,
    },

    /// Build check succeeded; preview can refresh
    #[serde(rename = "preview_ready", rename_all = "camelCase")]
    PreviewReady { chat_id: String, project_id: String },

    /// Resolved plan announcement
    #[serde(rename = "pipeline_plan", rename_all = "camelCase")]
    PipelinePlan { chat_id: String, agents: Vec<String> },

    /// Run interrupted (cost limit, stop, restart)
    #[serde(rename = "pipeline_interrupted", rename_all = "camelCase")]
    PipelineInterrupted { chat_id: String, reason: String },

    /// Checkpoint reached, waiting for resolution
    #[serde(rename = "pipeline_checkpoint", rename_all = "camelCase")]
    PipelineCheckpoint {
        chat_id: String,
        checkpoint_id: String,
        checkpoint_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },

    /// Checkpoint resolved by the user or by timeout
    #[serde(rename = "pipeline_checkpoint_resolved", rename_all = "camelCase")]
    PipelineCheckpointResolved {
        chat_id: String,
        checkpoint_id: String,
        choice: String,
    },

    /// Final test results for a test-run action
    #[serde(rename = "test_results", rename_all = "camelCase")]
    TestResults {
        chat_id: String,
        passed: u32,
        failed: u32,
        results: Vec<TestResult>,
    },

    /// One test result as it streams in
    #[serde(rename = "test_result_incremental", rename_all = "camelCase")]
    TestResultIncremental { chat_id: String, result: TestResult },

    /// Backend process came up
    #[serde(rename = "backend_ready", rename_all = "camelCase")]
    BackendReady { chat_id: String, url: String },

    /// Backend process failed
    #[serde(rename = "backend_error", rename_all = "camelCase")]
    BackendError { chat_id: String, error: String },

    /// Preview process exited
    #[serde(rename = "preview_exited", rename_all = "camelCase")]
    PreviewExited { chat_id: String, code: Option<i32> },
}

impl PipelineEvent {
    /// The chat this event belongs to
    pub fn chat_id(&self) -> &str {
        match self {
            PipelineEvent::AgentStatus { chat_id, .. }
            | PipelineEvent::AgentThinking { chat_id, .. }
            | PipelineEvent::AgentStream { chat_id, .. }
            | PipelineEvent::AgentError { chat_id, .. }
            | PipelineEvent::ChatMessage { chat_id, .. }
            | PipelineEvent::ChatRenamed { chat_id, .. }
            | PipelineEvent::TokenUsage { chat_id, .. }
            | PipelineEvent::FilesChanged { chat_id, .. }
            | PipelineEvent::PreviewReady { chat_id, .. }
            | PipelineEvent::PipelinePlan { chat_id, .. }
            | PipelineEvent::PipelineInterrupted { chat_id, .. }
            | PipelineEvent::PipelineCheckpoint { chat_id, .. }
            | PipelineEvent::PipelineCheckpointResolved { chat_id, .. }
            | PipelineEvent::TestResults { chat_id, .. }
            | PipelineEvent::TestResultIncremental { chat_id, .. }
            | PipelineEvent::BackendReady { chat_id, .. }
            | PipelineEvent::BackendError { chat_id, .. }
            | PipelineEvent::PreviewExited { chat_id, .. } => chat_id,
        }
    }

    /// Event type string as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::AgentStatus { .. } => "agent_status",
            PipelineEvent::AgentThinking { .. } => "agent_thinking",
            PipelineEvent::AgentStream { .. } => "agent_stream",
            PipelineEvent::AgentError { .. } => "agent_error",
            PipelineEvent::ChatMessage { .. } => "chat_message",
            PipelineEvent::ChatRenamed { .. } => "chat_renamed",
            PipelineEvent::TokenUsage { .. } => "token_usage",
            PipelineEvent::FilesChanged { .. } => "files_changed",
            PipelineEvent::PreviewReady { .. } => "preview_ready",
            PipelineEvent::PipelinePlan { .. } => "pipeline_plan",
            PipelineEvent::PipelineInterrupted { .. } => "pipeline_interrupted",
            PipelineEvent::PipelineCheckpoint { .. } => "pipeline_checkpoint",
            PipelineEvent::PipelineCheckpointResolved { .. } => "pipeline_checkpoint_resolved",
            PipelineEvent::TestResults { .. } => "test_results",
            PipelineEvent::TestResultIncremental { .. } => "test_result_incremental",
            PipelineEvent::BackendReady { .. } => "backend_ready",
            PipelineEvent::BackendError { .. } => "backend_error",
            PipelineEvent::PreviewExited { .. } => "preview_exited",
        }
    }
}

/// In-process pub/sub fanning events out to WebSocket clients
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event to all subscribers
    ///
    /// Lagging subscribers drop frames on their own receiver; the send never
    /// blocks the pipeline.
    pub fn emit(&self, event: PipelineEvent) {
        trace!(event_type = event.event_type(), chat = event.chat_id(), "emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to the raw firehose; callers filter by chat id
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = PipelineEvent::PipelineInterrupted {
            chat_id: "c1".to_string(),
            reason: "cost_limit".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pipeline_interrupted");
        assert_eq!(json["payload"]["chatId"], "c1");
        assert_eq!(json["payload"]["reason"], "cost_limit");
    }

    #[test]
    fn test_chat_id_accessor() {
        let event = PipelineEvent::AgentThinking {
            chat_id: "c2".to_string(),
            agent: "research".to_string(),
            chunk: "…".to_string(),
        };
        assert_eq!(event.chat_id(), "c2");
        assert_eq!(event.event_type(), "agent_thinking");
    }

    #[tokio::test]
    async fn test_fifo_per_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.emit(PipelineEvent::AgentThinking {
                chat_id: "c".to_string(),
                agent: "a".to_string(),
                chunk: i.to_string(),
            });
        }

        for i in 0..5 {
            match rx.recv().await.unwrap() {
                PipelineEvent::AgentThinking { chunk, .. } => assert_eq!(chunk, i.to_string()),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_chat_filter_is_strict() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::AgentStatus {
            chat_id: "chat-b".to_string(),
            agent: "research".to_string(),
            status: AgentStatus::Running,
        });

        // Subscriber interested in chat-a sees nothing from chat-b
        let mut seen_for_a = 0;
        while let Ok(event) = rx.try_recv() {
            if event.chat_id() == "chat-a" {
                seen_for_a += 1;
            }
        }
        assert_eq!(seen_for_a, 0);
    }
}
