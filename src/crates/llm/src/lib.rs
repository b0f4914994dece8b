//! Provider-agnostic streaming LLM gateway for pageforge.
//!
//! This crate owns everything between the orchestrator and a model API:
//!
//! - the [`ChatProvider`] trait with streaming and collected completions,
//! - remote implementations for Anthropic and OpenAI over SSE,
//! - token accounting ([`TokenCounts`]) and cost estimation
//!   ([`pricing::PricingTable`]),
//! - the chunk-boundary-tolerant `<tool_call>` scanner
//!   ([`tool_call::ToolCallScanner`]) used to split assistant text from
//!   embedded tool invocations,
//! - an error taxonomy whose [`LlmError::is_retryable`] classification
//!   drives the orchestrator's retry policy.
//!
//! Tool *routing* is deliberately not here: the scanner yields raw calls and
//! the orchestrator decides what they touch.

pub mod config;
pub mod error;
pub mod pricing;
pub mod provider;
pub mod remote;
pub mod tool_call;
pub mod types;

pub use config::ProviderConfig;
pub use error::{LlmError, Result};
pub use pricing::{ModelPricing, PricingTable};
pub use provider::ChatProvider;
pub use remote::{provider_for, AnthropicClient, OpenAiClient};
pub use tool_call::{parse_tool_call, ScanEvent, ToolCallRequest, ToolCallScanner};
pub use types::{
    ChatMessage, ChunkStream, Completion, CompletionRequest, MessageRole, StreamChunk, TokenCounts,
};
