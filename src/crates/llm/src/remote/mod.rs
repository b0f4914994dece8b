//! Remote provider implementations.
//!
//! Remote providers connect to cloud-hosted LLM APIs:
//! - **Anthropic** - Claude models
//! - **OpenAI** - GPT models

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use crate::provider::ChatProvider;
use std::sync::Arc;

/// Construct a provider by name.
pub fn provider_for(name: &str, config: ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
    match name {
        "anthropic" => Ok(Arc::new(AnthropicClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        other => Err(LlmError::ConfigError(format!(
            "unknown provider '{}'",
            other
        ))),
    }
}
