//! Anthropic Claude client implementation.
//!
//! Speaks the Messages API with SSE streaming. Claude keeps the system
//! prompt separate from conversation messages, reports input usage (with
//! cache splits) on `message_start` and output usage on `message_delta`.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use crate::provider::ChatProvider;
use crate::types::{ChunkStream, CompletionRequest, MessageRole, StreamChunk, TokenCounts};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
#[derive(Clone)]
pub struct AnthropicClient {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::HttpError)?;
        Ok(Self { config, client })
    }

    /// Split the request into Claude's system/messages shape, folding any
    /// system-role messages into the system prompt.
    fn convert_messages(request: &CompletionRequest) -> (Option<String>, Vec<WireMessage>) {
        let mut system = request.system.clone();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                MessageRole::System => {
                    system = Some(match system {
                        Some(existing) => format!("{}\n\n{}", existing, msg.content),
                        None => msg.content.clone(),
                    });
                }
                MessageRole::User => messages.push(WireMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
                MessageRole::Assistant => messages.push(WireMessage {
                    role: "assistant",
                    content: msg.content.clone(),
                }),
            }
        }

        (system, messages)
    }

    fn map_status(status: StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationError(body),
            404 => LlmError::ModelNotFound(body),
            429 => LlmError::RateLimitExceeded(body),
            400 => LlmError::InvalidRequest(body),
            500..=599 => LlmError::ServiceUnavailable(body),
            _ => LlmError::ProviderError(body),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let (system, messages) = Self::convert_messages(&request);
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        let body = WireRequest {
            model: &model,
            messages,
            system,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };

        debug!(model = %model, messages = body.messages.len(), "anthropic stream request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::HttpError)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    let event: Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    match event["type"].as_str() {
                        Some("message_start") => {
                            let usage = &event["message"]["usage"];
                            yield StreamChunk::Usage(TokenCounts {
                                input_tokens: usage["input_tokens"].as_u64().unwrap_or(0),
                                output_tokens: 0,
                                cache_read_tokens: usage["cache_read_input_tokens"]
                                    .as_u64()
                                    .unwrap_or(0),
                                cache_write_tokens: usage["cache_creation_input_tokens"]
                                    .as_u64()
                                    .unwrap_or(0),
                            });
                        }
                        Some("content_block_delta") => {
                            if let Some(text) = event["delta"]["text"].as_str() {
                                yield StreamChunk::TextDelta(text.to_string());
                            }
                        }
                        Some("message_delta") => {
                            if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                                yield StreamChunk::Usage(TokenCounts {
                                    output_tokens: output,
                                    ..Default::default()
                                });
                            }
                            if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                                yield StreamChunk::Done {
                                    stop_reason: Some(reason.to_string()),
                                };
                            }
                        }
                        Some("message_stop") => {
                            yield StreamChunk::Done { stop_reason: None };
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn config() -> ProviderConfig {
        ProviderConfig::new("test-key", "https://api.anthropic.com", "claude-sonnet-4-5")
    }

    #[test]
    fn test_system_messages_folded() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
        ])
        .with_system("Base prompt");

        let (system, messages) = AnthropicClient::convert_messages(&request);
        assert_eq!(system.as_deref(), Some("Base prompt\n\nYou are helpful"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            AnthropicClient::map_status(StatusCode::UNAUTHORIZED, String::new()),
            LlmError::AuthenticationError(_)
        ));
        assert!(matches!(
            AnthropicClient::map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            AnthropicClient::map_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            LlmError::ServiceUnavailable(_)
        ));
    }

    #[test]
    fn test_client_construction() {
        let client = AnthropicClient::new(config()).unwrap();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.default_model(), "claude-sonnet-4-5");
    }
}
