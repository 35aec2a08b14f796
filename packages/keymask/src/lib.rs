//! Keymask - schema-constrained JSON decoding
//!
//! This crate sits between a language model's forward pass and its
//! sampler. On every decode step it rewrites the vocabulary-sized logit
//! vector so only token ids consistent with a caller-supplied JSON schema
//! can be drawn, guaranteeing that generated object keys are exactly the
//! schema-declared keys at every nesting level.
//!
//! The sampler integrates through three calls on [`LogitProcessor`]:
//! `on_prompt` once before step zero, then `process_logits` and
//! `on_sampled_token` alternating until generation stops. The model side
//! is reached only through the [`TokenizerAdapter`] trait.
//!
//! [`LogitProcessor`]: crate::core::generation::LogitProcessor
//! [`TokenizerAdapter`]: crate::core::tokenizer::TokenizerAdapter

/// Core components (tries, registry, generation pipeline)
pub mod core;
/// Domain types (schema tree, errors)
pub mod domain;

// Prelude - everything a sampler integration needs
pub mod prelude {
    pub use crate::core::generation::{
        ConstraintConfig, ConstraintStatistics, LogitProcessor, RetryPolicy, drive,
        validate,
    };
    pub use crate::core::index::SchemaTrieIndex;
    pub use crate::core::special_tokens::SpecialTokenRegistry;
    pub use crate::core::tokenizer::{TokenizerAdapter, VocabTokenizer};
    pub use crate::core::trie::{TokenTrie, TriePath};
    pub use crate::domain::error::{ConstraintError, ConstraintResult};
    pub use crate::domain::schema::{NodeId, SchemaKind, SchemaNode};

    #[cfg(feature = "hf-tokenizers")]
    pub use crate::core::tokenizer::HfTokenizer;
}

pub use prelude::*;
