//! Retry policy around validator failures
//!
//! Mid-generation fatal errors abort immediately. A validator failure may
//! be retried with the temperature bumped a fixed step per attempt, capped;
//! a caller-supplied sampler seed disables retries entirely since re-running
//! the same seed would reproduce the same output.

use super::config::ConstraintConfig;
use super::validator;
use crate::domain::error::{ConstraintError, ConstraintResult};
use crate::domain::schema::SchemaNode;

/// Retry schedule for recoverable generation failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// How many retries follow the initial attempt
    pub max_attempts: usize,
    /// Temperature added per retry
    pub temperature_step: f32,
    /// Ceiling the bumped temperature never exceeds
    pub temperature_cap: f32,
}

impl RetryPolicy {
    /// Policy with the documented defaults
    pub fn new() -> Self {
        Self {
            max_attempts: 2,
            temperature_step: 0.1,
            temperature_cap: 1.5,
        }
    }

    /// Derive the policy from a constraint configuration
    pub fn from_config(config: &ConstraintConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            ..Self::new()
        }
    }

    /// Temperature to use for a given attempt index (0 = first attempt)
    pub fn temperature_for(&self, base: f32, attempt: usize) -> f32 {
        (base + self.temperature_step * attempt as f32).min(self.temperature_cap)
    }

    /// Whether a failed attempt should be rerun
    pub fn should_retry(
        &self,
        error: &ConstraintError,
        attempt: usize,
        seeded: bool,
    ) -> bool {
        error.is_retriable() && attempt < self.max_attempts && !seeded
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Run attempts until one validates or the policy is exhausted
///
/// `attempt` receives the temperature for this try and the attempt index,
/// runs one full sampler loop, and returns the generated string or a
/// mid-generation fatal error. The prompt and schema are never mutated
/// between attempts.
pub fn drive<F>(
    policy: &RetryPolicy,
    schema: &SchemaNode,
    base_temperature: f32,
    seed: Option<u64>,
    mut attempt: F,
) -> ConstraintResult<String>
where
    F: FnMut(f32, usize) -> ConstraintResult<String>,
{
    let mut attempt_idx = 0;
    loop {
        let temperature = policy.temperature_for(base_temperature, attempt_idx);
        let text = attempt(temperature, attempt_idx)?;
        match validator::validate(&text, schema) {
            Ok(_) => return Ok(text),
            Err(error) => {
                if policy.should_retry(&error, attempt_idx, seed.is_some()) {
                    attempt_idx += 1;
                    log::warn!(
                        "attempt {attempt_idx} failed validation ({error}), \
                         retrying at temperature {:.2}",
                        policy.temperature_for(base_temperature, attempt_idx)
                    );
                    continue;
                }
                return Err(error);
            }
        }
    }
}
