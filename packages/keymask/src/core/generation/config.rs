//! Constraint configuration and parameter management

use crate::core::index::DEFAULT_INDEX_CACHE_MAX;

/// Tunable parameters of the constrained decoding core
///
/// Covers soft-bias strength, the dynamic closing-quote search width, the
/// process-wide index cache ceiling, the retry budget, and the EOS boost
/// applied when a step degrades to safety termination.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintConfig {
    /// Additive bias applied to tokens in a soft preference set
    pub soft_bias_magnitude: f32,

    /// How many of the highest-scoring quote-containing tokens to admit
    /// when the tokenizer has no exact `"` token
    pub dynamic_quote_top_k: usize,

    /// Ceiling of the process-wide schema trie index cache
    pub schema_index_cache_max: usize,

    /// How many times a validator failure may be retried
    pub retry_max_attempts: usize,

    /// Added to the EOS logit when returning safety-constrained logits
    pub eos_boost_on_safety: f32,
}

impl ConstraintConfig {
    /// Create a configuration with the documented defaults
    pub fn new() -> Self {
        Self {
            soft_bias_magnitude: 2.5,
            dynamic_quote_top_k: 30,
            schema_index_cache_max: DEFAULT_INDEX_CACHE_MAX,
            retry_max_attempts: 2,
            eos_boost_on_safety: 5.0,
        }
    }

    /// Builder method to set the soft bias magnitude
    pub fn with_soft_bias(mut self, bias: f32) -> Self {
        self.soft_bias_magnitude = bias;
        self
    }

    /// Builder method to set the dynamic closing-quote width
    pub fn with_dynamic_quote_top_k(mut self, top_k: usize) -> Self {
        self.dynamic_quote_top_k = top_k;
        self
    }

    /// Builder method to set the index cache ceiling
    pub fn with_schema_index_cache_max(mut self, max: usize) -> Self {
        self.schema_index_cache_max = max;
        self
    }

    /// Builder method to set the retry budget
    pub fn with_retry_max_attempts(mut self, attempts: usize) -> Self {
        self.retry_max_attempts = attempts;
        self
    }

    /// Builder method to set the safety EOS boost
    pub fn with_eos_boost_on_safety(mut self, boost: f32) -> Self {
        self.eos_boost_on_safety = boost;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.soft_bias_magnitude.is_finite() || self.soft_bias_magnitude < 0.0 {
            return Err("Soft bias must be finite and non-negative".to_string());
        }
        if self.dynamic_quote_top_k == 0 {
            return Err("Dynamic quote top-k must be greater than 0".to_string());
        }
        if self.schema_index_cache_max == 0 {
            return Err("Schema index cache ceiling must be greater than 0".to_string());
        }
        if !self.eos_boost_on_safety.is_finite() {
            return Err("EOS safety boost must be finite".to_string());
        }
        Ok(())
    }
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self::new()
    }
}
