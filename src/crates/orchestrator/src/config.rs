//! Server and pipeline configuration
//!
//! Everything is readable from environment variables with built-in
//! fallbacks; the server binary loads once at startup and hands clones to
//! the engine. Cost limits may additionally be overridden per deployment
//! through `app_settings`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Pipeline execution defaults, overridable per node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefaults {
    /// Output token cap for agent steps without a per-node override
    pub default_max_output_tokens: u32,

    /// Tool step cap for agent steps without a per-node override
    pub default_max_tool_steps: u32,

    /// Build-check subprocess timeout
    pub build_timeout_ms: u64,

    /// Test-run subprocess timeout
    pub test_timeout_ms: u64,

    /// Attempt cap for the build fix loop
    pub max_build_fix_attempts: u32,

    /// Cycle cap for the remediation loop
    pub max_remediation_cycles: u32,

    /// Failing-test cap before the test fix loop gives up
    pub max_test_failures: u32,

    /// Unique build error signatures fed to the fix agent
    pub max_unique_errors: u32,

    /// Base wall clock granted to every agent step
    pub agent_base_timeout_ms: u64,

    /// Additional wall clock granted per 1k output tokens
    pub agent_timeout_ms_per_1k_tokens: u64,

    /// Transient-failure retry cap for agent steps
    pub max_agent_retries: u32,

    /// Initial backoff between retry attempts
    pub retry_initial_backoff_ms: u64,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            default_max_output_tokens: 8192,
            default_max_tool_steps: 20,
            build_timeout_ms: 120_000,
            test_timeout_ms: 180_000,
            max_build_fix_attempts: 3,
            max_remediation_cycles: 2,
            max_test_failures: 10,
            max_unique_errors: 8,
            agent_base_timeout_ms: 60_000,
            agent_timeout_ms_per_1k_tokens: 15_000,
            max_agent_retries: 2,
            retry_initial_backoff_ms: 1_000,
        }
    }
}

impl PipelineDefaults {
    /// Load from environment, falling back to built-ins
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            default_max_output_tokens: env_u32(
                "PIPELINE_DEFAULT_MAX_OUTPUT_TOKENS",
                base.default_max_output_tokens,
            ),
            default_max_tool_steps: env_u32(
                "PIPELINE_DEFAULT_MAX_TOOL_STEPS",
                base.default_max_tool_steps,
            ),
            build_timeout_ms: env_u64("PIPELINE_BUILD_TIMEOUT_MS", base.build_timeout_ms),
            test_timeout_ms: env_u64("PIPELINE_TEST_TIMEOUT_MS", base.test_timeout_ms),
            max_build_fix_attempts: env_u32(
                "PIPELINE_MAX_BUILD_FIX_ATTEMPTS",
                base.max_build_fix_attempts,
            ),
            max_remediation_cycles: env_u32(
                "PIPELINE_MAX_REMEDIATION_CYCLES",
                base.max_remediation_cycles,
            ),
            max_test_failures: env_u32("PIPELINE_MAX_TEST_FAILURES", base.max_test_failures),
            max_unique_errors: env_u32("PIPELINE_MAX_UNIQUE_ERRORS", base.max_unique_errors),
            agent_base_timeout_ms: env_u64(
                "PIPELINE_AGENT_BASE_TIMEOUT_MS",
                base.agent_base_timeout_ms,
            ),
            agent_timeout_ms_per_1k_tokens: env_u64(
                "PIPELINE_AGENT_TIMEOUT_MS_PER_1K_TOKENS",
                base.agent_timeout_ms_per_1k_tokens,
            ),
            max_agent_retries: env_u32("PIPELINE_MAX_AGENT_RETRIES", base.max_agent_retries),
            retry_initial_backoff_ms: env_u64(
                "PIPELINE_RETRY_INITIAL_BACKOFF_MS",
                base.retry_initial_backoff_ms,
            ),
        }
    }

    /// Wall-clock budget for an agent step given its output token cap
    pub fn agent_timeout_ms(&self, max_output_tokens: u32) -> u64 {
        self.agent_base_timeout_ms
            + (max_output_tokens as u64).div_ceil(1000) * self.agent_timeout_ms_per_1k_tokens
    }
}

/// Cost budget limits in USD; zero disables a limit
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLimits {
    /// Cumulative per-chat cost ceiling
    pub chat_cost_usd: f64,

    /// Cumulative per-project cost ceiling
    pub project_cost_usd: f64,
}

impl CostLimits {
    /// Load from environment, falling back to disabled
    pub fn from_env() -> Self {
        Self {
            chat_cost_usd: env_f64("PIPELINE_CHAT_COST_LIMIT_USD", 0.0),
            project_cost_usd: env_f64("PIPELINE_PROJECT_COST_LIMIT_USD", 0.0),
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener port
    pub port: u16,

    /// SQLite database location
    pub database_url: String,

    /// Root directory for per-project working trees
    pub workspace_dir: PathBuf,

    /// Whether chats on a locked project fail fast instead of waiting
    pub project_lock_fail_fast: bool,

    /// Pipeline execution defaults
    pub defaults: PipelineDefaults,

    /// Cost budget limits
    pub limits: CostLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            database_url: "sqlite:pageforge.db".to_string(),
            workspace_dir: PathBuf::from("./workspace"),
            project_lock_fail_fast: false,
            defaults: PipelineDefaults::default(),
            limits: CostLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load from environment, falling back to built-ins
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            port: std::env::var("PIPELINE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            database_url: std::env::var("PIPELINE_DB").unwrap_or(base.database_url),
            workspace_dir: std::env::var("PIPELINE_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(base.workspace_dir),
            project_lock_fail_fast: std::env::var("PIPELINE_PROJECT_LOCK_FAIL_FAST")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(base.project_lock_fail_fast),
            defaults: PipelineDefaults::from_env(),
            limits: CostLimits::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let d = PipelineDefaults::default();
        assert!(d.default_max_output_tokens > 0);
        assert!(d.max_build_fix_attempts > 0);
        assert!(d.build_timeout_ms > 0);
    }

    #[test]
    fn test_agent_timeout_scales_with_tokens() {
        let d = PipelineDefaults::default();
        let small = d.agent_timeout_ms(1000);
        let large = d.agent_timeout_ms(8000);
        assert!(large > small);
        assert_eq!(small, d.agent_base_timeout_ms + d.agent_timeout_ms_per_1k_tokens);
    }

    #[test]
    fn test_zero_limits_mean_disabled() {
        let limits = CostLimits::default();
        assert_eq!(limits.chat_cost_usd, 0.0);
        assert_eq!(limits.project_cost_usd, 0.0);
    }
}
