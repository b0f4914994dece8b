//! Common configuration structures for LLM providers.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_retries() -> u32 {
    3
}

/// Configuration for remote LLM providers (Anthropic, OpenAI, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    ///
    /// Examples:
    /// - Anthropic: "https://api.anthropic.com"
    /// - OpenAI: "https://api.openai.com/v1"
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Request timeout duration.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum retries for failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Organization ID (optional, for providers that support it).
    pub organization: Option<String>,
}

impl ProviderConfig {
    /// Create a new provider configuration.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            organization: None,
        }
    }

    /// Load the API key from an environment variable.
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::ApiKeyNotFound(env_var.to_string()))?;
        Ok(Self::new(api_key, base_url, model))
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the organization ID.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ProviderConfig::new("key", "https://api.anthropic.com", "claude-sonnet-4-5")
            .with_timeout(Duration::from_secs(60))
            .with_max_retries(5);

        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert!(config.organization.is_none());
    }

    #[test]
    fn test_from_env_missing_key() {
        let result = ProviderConfig::from_env(
            "PAGEFORGE_TEST_MISSING_KEY",
            "https://api.anthropic.com",
            "claude-sonnet-4-5",
        );
        assert!(matches!(result, Err(LlmError::ApiKeyNotFound(_))));
    }
}
