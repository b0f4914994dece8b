//! Per-provider pricing tables and cost estimation.
//!
//! Prices are USD per million tokens. The table ships with defaults for the
//! common hosted models and can be extended or overridden from configuration;
//! unknown models estimate at zero so a missing table entry never blocks a
//! pipeline.

use crate::types::TokenCounts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Prompt tokens.
    pub input_per_mtok: f64,
    /// Completion tokens.
    pub output_per_mtok: f64,
    /// Prompt-cache reads.
    pub cache_read_per_mtok: f64,
    /// Prompt-cache writes.
    pub cache_write_per_mtok: f64,
}

impl ModelPricing {
    /// Estimate the cost of a call in USD.
    pub fn estimate(&self, usage: &TokenCounts) -> f64 {
        const MTOK: f64 = 1_000_000.0;
        usage.input_tokens as f64 / MTOK * self.input_per_mtok
            + usage.output_tokens as f64 / MTOK * self.output_per_mtok
            + usage.cache_read_tokens as f64 / MTOK * self.cache_read_per_mtok
            + usage.cache_write_tokens as f64 / MTOK * self.cache_write_per_mtok
    }
}

/// Pricing lookup keyed by `(provider, model)` with model-prefix fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable {
    entries: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Table with built-in defaults for common hosted models.
    pub fn with_defaults() -> Self {
        let mut table = Self::default();
        table.insert(
            "anthropic",
            "claude-sonnet",
            ModelPricing {
                input_per_mtok: 3.0,
                output_per_mtok: 15.0,
                cache_read_per_mtok: 0.3,
                cache_write_per_mtok: 3.75,
            },
        );
        table.insert(
            "anthropic",
            "claude-haiku",
            ModelPricing {
                input_per_mtok: 0.8,
                output_per_mtok: 4.0,
                cache_read_per_mtok: 0.08,
                cache_write_per_mtok: 1.0,
            },
        );
        table.insert(
            "anthropic",
            "claude-opus",
            ModelPricing {
                input_per_mtok: 15.0,
                output_per_mtok: 75.0,
                cache_read_per_mtok: 1.5,
                cache_write_per_mtok: 18.75,
            },
        );
        table.insert(
            "openai",
            "gpt-4o",
            ModelPricing {
                input_per_mtok: 2.5,
                output_per_mtok: 10.0,
                cache_read_per_mtok: 1.25,
                cache_write_per_mtok: 0.0,
            },
        );
        table.insert(
            "openai",
            "gpt-4o-mini",
            ModelPricing {
                input_per_mtok: 0.15,
                output_per_mtok: 0.6,
                cache_read_per_mtok: 0.075,
                cache_write_per_mtok: 0.0,
            },
        );
        table
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, provider: &str, model: &str, pricing: ModelPricing) {
        self.entries
            .insert(Self::key(provider, model), pricing);
    }

    /// Look up pricing for a model.
    ///
    /// Exact match first, then the longest registered prefix of the model
    /// name (so `claude-sonnet-4-5-20250929` matches `claude-sonnet`).
    pub fn lookup(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        if let Some(pricing) = self.entries.get(&Self::key(provider, model)) {
            return Some(*pricing);
        }

        let provider_prefix = format!("{}/", provider);
        self.entries
            .iter()
            .filter(|(key, _)| {
                key.starts_with(&provider_prefix)
                    && model.starts_with(&key[provider_prefix.len()..])
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(_, pricing)| *pricing)
    }

    /// Estimate the cost of a call; unknown models estimate at zero.
    pub fn estimate(&self, provider: &str, model: &str, usage: &TokenCounts) -> f64 {
        self.lookup(provider, model)
            .map(|pricing| pricing.estimate(usage))
            .unwrap_or(0.0)
    }

    fn key(provider: &str, model: &str) -> String {
        format!("{}/{}", provider, model)
    }
}
