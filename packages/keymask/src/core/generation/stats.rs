//! Constraint statistics and step accounting
//!
//! Tracks how each decode step was constrained, trie and cache activity,
//! and wall-clock timing for the generation as a whole.

use std::time::{Duration, Instant};

/// Per-generation statistics of the constraint pipeline
#[derive(Debug, Clone)]
pub struct ConstraintStatistics {
    /// Total `process_logits` calls
    pub steps: u64,

    /// Steps that applied a hard mask
    pub hard_steps: u64,

    /// Steps that applied a soft preference
    pub soft_steps: u64,

    /// Steps that left the logits untouched
    pub unconstrained_steps: u64,

    /// Steps that returned safety-constrained logits
    pub safety_steps: u64,

    /// Tokens reported through `on_sampled_token`
    pub tokens_generated: u64,

    /// Sum of hard allow-set sizes, for average reporting
    pub allow_set_total: u64,

    /// Total generation time
    pub total_duration: Duration,

    generation_start: Option<Instant>,
}

impl ConstraintStatistics {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self {
            steps: 0,
            hard_steps: 0,
            soft_steps: 0,
            unconstrained_steps: 0,
            safety_steps: 0,
            tokens_generated: 0,
            allow_set_total: 0,
            total_duration: Duration::ZERO,
            generation_start: None,
        }
    }

    /// Start tracking generation time
    pub fn start_generation(&mut self) {
        self.generation_start = Some(Instant::now());
    }

    /// Stop tracking generation time and update the total duration
    pub fn stop_generation(&mut self) {
        if let Some(start) = self.generation_start.take() {
            self.total_duration = start.elapsed();
        }
    }

    /// Record a hard-masked step with its allow-set size
    pub fn record_hard_step(&mut self, allow_set_size: usize) {
        self.steps += 1;
        self.hard_steps += 1;
        self.allow_set_total += allow_set_size as u64;
    }

    /// Record a soft-biased step
    pub fn record_soft_step(&mut self) {
        self.steps += 1;
        self.soft_steps += 1;
    }

    /// Record an unconstrained step
    pub fn record_unconstrained_step(&mut self) {
        self.steps += 1;
        self.unconstrained_steps += 1;
    }

    /// Record a safety-terminated step
    pub fn record_safety_step(&mut self) {
        self.steps += 1;
        self.safety_steps += 1;
    }

    /// Record one sampled token
    pub fn record_token(&mut self) {
        self.tokens_generated += 1;
    }

    /// Average hard allow-set size
    pub fn average_allow_set(&self) -> f64 {
        if self.hard_steps > 0 {
            self.allow_set_total as f64 / self.hard_steps as f64
        } else {
            0.0
        }
    }

    /// Fraction of steps that were hard-masked, as a percentage
    pub fn hard_step_rate(&self) -> f64 {
        if self.steps > 0 {
            (self.hard_steps as f64 / self.steps as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Tokens per second over the tracked duration
    pub fn tokens_per_second(&self) -> f64 {
        if self.total_duration.as_secs_f64() > 0.0 {
            self.tokens_generated as f64 / self.total_duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Formatted one-line summary
    pub fn summary(&self) -> String {
        format!(
            "steps: {} (hard {:.1}%, avg allow {:.1}) | tokens: {} | {:.2} tok/s",
            self.steps,
            self.hard_step_rate(),
            self.average_allow_set(),
            self.tokens_generated,
            self.tokens_per_second()
        )
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ConstraintStatistics {
    fn default() -> Self {
        Self::new()
    }
}
