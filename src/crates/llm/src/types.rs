//! Request, response, and streaming types shared by all providers.

use crate::error::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction.
    System,
    /// End-user message.
    User,
    /// Model output.
    Assistant,
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A streaming completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier; empty means the provider's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// System prompt, kept separate from the message list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Output token cap.
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request from a message list with a default token cap.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: None,
            system: None,
            messages,
            max_tokens: 4096,
            temperature: None,
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the provider's default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }
}

/// Token accounting for one completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Tokens served from the provider's prompt cache.
    pub cache_read_tokens: u64,
    /// Tokens written to the provider's prompt cache.
    pub cache_write_tokens: u64,
}

impl TokenCounts {
    /// Total billable tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_write_tokens
    }

    /// Merge counts from a later usage frame; providers report input usage
    /// on the opening frame and output usage at the end.
    pub fn merge(&mut self, other: &TokenCounts) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.max(other.cache_read_tokens);
        self.cache_write_tokens = self.cache_write_tokens.max(other.cache_write_tokens);
    }
}

/// One frame of a streaming completion.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Incremental assistant text.
    TextDelta(String),
    /// Usage frame; may arrive more than once and should be merged.
    Usage(TokenCounts),
    /// Terminal frame with the provider's stop reason.
    Done { stop_reason: Option<String> },
}

/// Stream of completion frames.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A fully-collected completion.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Assistant text.
    pub content: String,
    /// Token accounting.
    pub usage: TokenCounts,
    /// Provider stop reason.
    pub stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_system("Be helpful")
            .with_max_tokens(256)
            .with_temperature(1.5);

        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.system.as_deref(), Some("Be helpful"));
        // Temperature is clamped into [0, 1]
        assert_eq!(request.temperature, Some(1.0));
    }

    #[test]
    fn test_token_counts_merge() {
        let mut usage = TokenCounts {
            input_tokens: 120,
            output_tokens: 0,
            cache_read_tokens: 40,
            cache_write_tokens: 0,
        };
        usage.merge(&TokenCounts {
            input_tokens: 0,
            output_tokens: 512,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
        });
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 512);
        assert_eq!(usage.total(), 672);
    }
}
