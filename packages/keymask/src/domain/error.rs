//! Error types for the constrained decoding core

use thiserror::Error;

/// Error type for schema-constrained decoding operations
///
/// Covers build-time failures (unconstrainable keys, empty schemas),
/// mid-generation fatal conditions (empty allow-sets, off-trie tokens),
/// and post-generation validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// A hard policy produced an empty allow-set while the state machine
    /// was not done. Fatal for the current attempt.
    #[error("no valid tokens at step {position} (partial key: {partial_key:?})")]
    NoValidTokens {
        /// The key prefix accumulated when the allow-set collapsed, if any
        partial_key: Option<String>,
        /// Number of tokens generated when the condition was detected
        position: usize,
    },

    /// The sampler picked a token whose characters are JSON-valid but whose
    /// id is not an edge in the current key trie. Indicates the hard mask
    /// was not applied to the step that produced it. Fatal.
    #[error("token {token_id} is not a trie edge (partial key: {partial_key:?})")]
    InvalidTokenSelected {
        /// The offending token id
        token_id: u32,
        /// The key prefix accumulated so far, if any
        partial_key: Option<String>,
    },

    /// An object node declares no keys where keys are required.
    /// Surfaced at index build time, before any generation runs.
    #[error("schema object declares no keys")]
    EmptyConstraints,

    /// The generated output parsed as JSON but an object carried a key
    /// outside its schema node's declared key set.
    #[error("schema violation: {reason}")]
    SchemaViolation {
        /// Human-readable description including the offending key and path
        reason: String,
    },

    /// A declared key cannot be represented as a token-trie path
    #[error("key {key:?} cannot be constrained: {reason}")]
    InvalidKey {
        /// The declared key that was rejected
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// The tokenizer adapter failed to encode or decode
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

impl ConstraintError {
    /// Whether a failed attempt may be retried with perturbed sampling
    ///
    /// Only post-generation validator failures are retriable; mid-generation
    /// fatal conditions and build-time errors are not.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }

    /// Whether the error was detected before any generation ran
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyConstraints | Self::InvalidKey { .. } | Self::Tokenizer(_)
        )
    }
}

/// Result type for constrained decoding operations
pub type ConstraintResult<T> = std::result::Result<T, ConstraintError>;
