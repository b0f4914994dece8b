//! Core provider trait.
//!
//! The orchestrator talks to every model through [`ChatProvider`];
//! implementations handle message conversion, transport, and SSE parsing for
//! their particular API. Cancellation is cooperative: dropping the returned
//! stream aborts the underlying request.

use crate::error::Result;
use crate::types::{ChunkStream, Completion, CompletionRequest, StreamChunk};
use async_trait::async_trait;
use futures::StreamExt;

/// Chat-based language model with streaming output.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name used in token-usage records and pricing lookups.
    fn name(&self) -> &str;

    /// Model identifier used when the request does not override it.
    fn default_model(&self) -> &str;

    /// Stream a completion frame by frame.
    async fn stream_chat(&self, request: CompletionRequest) -> Result<ChunkStream>;

    /// Collect a full completion by draining the stream.
    async fn chat(&self, request: CompletionRequest) -> Result<Completion> {
        let mut stream = self.stream_chat(request).await?;
        let mut completion = Completion::default();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::TextDelta(text) => completion.content.push_str(&text),
                StreamChunk::Usage(usage) => completion.usage.merge(&usage),
                StreamChunk::Done { stop_reason } => {
                    completion.stop_reason = stop_reason;
                    break;
                }
            }
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenCounts;
    use async_stream::stream;

    struct FakeProvider;

    #[async_trait]
    impl ChatProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn default_model(&self) -> &str {
            "fake-model"
        }

        async fn stream_chat(&self, _request: CompletionRequest) -> Result<ChunkStream> {
            let s = stream! {
                yield Ok(StreamChunk::Usage(TokenCounts {
                    input_tokens: 10,
                    ..Default::default()
                }));
                yield Ok(StreamChunk::TextDelta("Hello ".to_string()));
                yield Ok(StreamChunk::TextDelta("world".to_string()));
                yield Ok(StreamChunk::Usage(TokenCounts {
                    output_tokens: 2,
                    ..Default::default()
                }));
                yield Ok(StreamChunk::Done { stop_reason: Some("end_turn".to_string()) });
            };
            Ok(Box::pin(s))
        }
    }

    #[tokio::test]
    async fn test_chat_collects_stream() {
        let provider = FakeProvider;
        let completion = provider
            .chat(CompletionRequest::new(vec![crate::types::ChatMessage::user(
                "hi",
            )]))
            .await
            .unwrap();

        assert_eq!(completion.content, "Hello world");
        assert_eq!(completion.usage.input_tokens, 10);
        assert_eq!(completion.usage.output_tokens, 2);
        assert_eq!(completion.stop_reason.as_deref(), Some("end_turn"));
    }
}
