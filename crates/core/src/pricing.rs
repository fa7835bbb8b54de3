// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-model token pricing (USD per 1M tokens, sync mode).

use crate::record::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fraction of the input rate charged for cache reads when no explicit rate
/// is configured.
pub const DEFAULT_CACHE_READ_FACTOR: f64 = 0.1;

/// Discount applied by every provider's batch API.
pub const BATCH_DISCOUNT: f64 = 0.5;

/// Pricing for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Input price per 1M tokens
    pub input_per_million: f64,
    /// Output price per 1M tokens
    pub output_per_million: f64,
    /// Cache-read price per 1M tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_per_million: Option<f64>,
}

impl ModelPricing {
    /// Pricing with the default cache-read rate.
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cache_read_per_million: None,
        }
    }

    /// Effective cache-read rate.
    pub fn cache_read_rate(&self) -> f64 {
        self.cache_read_per_million
            .unwrap_or(self.input_per_million * DEFAULT_CACHE_READ_FACTOR)
    }

    /// Cost of a usage sample in USD.
    pub fn calculate(&self, usage: &TokenUsage) -> f64 {
        let per_token = |tokens: u64, rate: f64| (tokens as f64 / 1_000_000.0) * rate;
        per_token(usage.input_tokens, self.input_per_million)
            + per_token(usage.output_tokens, self.output_per_million)
            + per_token(usage.cache_read_tokens, self.cache_read_rate())
    }
}

/// Model name → pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(BTreeMap<String, ModelPricing>);

impl PricingTable {
    /// Empty table.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add or replace a model's pricing.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.0.insert(model.into(), pricing);
    }

    /// Pricing for a model, if known.
    pub fn for_model(&self, model: &str) -> Option<&ModelPricing> {
        self.0.get(model)
    }

    /// Cost of a usage sample, if the model is priced.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> Option<f64> {
        self.for_model(model).map(|p| p.calculate(usage))
    }

    /// Number of priced models.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (model, input, output) in [
            ("gemini-2.0-flash", 0.10, 0.40),
            ("gemini-2.5-flash", 0.30, 2.50),
            ("gemini-3-flash", 0.50, 3.00),
            ("gemini-2.5-pro", 1.25, 10.00),
            ("claude-haiku-4-5", 0.80, 4.00),
            ("claude-sonnet-4-5", 3.00, 15.00),
            ("claude-sonnet-4-6", 3.00, 15.00),
            ("claude-opus-4-6", 5.00, 25.00),
            ("gpt-5-mini", 0.25, 2.00),
            ("gpt-5.2", 1.75, 14.00),
        ] {
            table.insert(model, ModelPricing::new(input, output));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate() {
        let pricing = ModelPricing::new(3.00, 15.00);
        let usage = TokenUsage::new(1_000_000, 1_000_000, 0);
        assert!((pricing.calculate(&usage) - 18.00).abs() < 1e-9);
    }

    #[test]
    fn test_cache_read_defaults_to_tenth_of_input() {
        let pricing = ModelPricing::new(1.00, 0.0);
        let usage = TokenUsage::new(0, 0, 1_000_000);
        assert!((pricing.calculate(&usage) - 0.10).abs() < 1e-9);

        let explicit = ModelPricing {
            cache_read_per_million: Some(0.5),
            ..pricing
        };
        assert!((explicit.calculate(&usage) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_default_table() {
        let table = PricingTable::default();
        assert_eq!(table.len(), 10);
        let flash = table.for_model("gemini-2.0-flash").unwrap();
        assert_eq!(flash.input_per_million, 0.10);
        assert!(table.cost("unknown-model", &TokenUsage::default()).is_none());
    }
}
