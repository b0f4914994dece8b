//! OpenAI client implementation.
//!
//! Speaks the Chat Completions API with SSE streaming. System prompts travel
//! inline as a leading `system` message; usage arrives as a trailing frame
//! when `stream_options.include_usage` is set; the stream ends with a
//! literal `[DONE]` sentinel.

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

/// OpenAI Chat Completions API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::HttpError)?;
        Ok(Self { config, client })
    }

    fn convert_messages(request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system.clone(),
            });
        }
        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            messages.push(WireMessage {
                role,
                content: msg.content.clone(),
            });
        }
        messages
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
impl ChatProvider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<ChunkStream> {
        let messages = Self::convert_messages(&request);
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
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        debug!(model = %model, "openai stream request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = String::new();
            let mut stop_reason: Option<String> = None;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::HttpError)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    if data == "[DONE]" {
                        yield StreamChunk::Done {
                            stop_reason: stop_reason.take(),
                        };
                        continue;
                    }

                    let event: Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };

                    if let Some(choice) = event["choices"].get(0) {
                        if let Some(text) = choice["delta"]["content"].as_str() {
                            if !text.is_empty() {
                                yield StreamChunk::TextDelta(text.to_string());
                            }
                        }
                        if let Some(reason) = choice["finish_reason"].as_str() {
                            stop_reason = Some(reason.to_string());
                        }
                    }

                    if let Some(usage) = event.get("usage").filter(|u| !u.is_null()) {
                        yield StreamChunk::Usage(TokenCounts {
                            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
                            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
                            cache_read_tokens: usage["prompt_tokens_details"]["cached_tokens"]
                                .as_u64()
                                .unwrap_or(0),
                            cache_write_tokens: 0,
                        });
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
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
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

    #[test]
    fn test_system_prompt_leads_message_list() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hello")])
            .with_system("Be helpful");
        let messages = OpenAiClient::convert_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_client_construction() {
        let config = ProviderConfig::new("key", "https://api.openai.com/v1", "gpt-4o");
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.name(), "openai");
        assert_eq!(client.default_model(), "gpt-4o");
    }
}
