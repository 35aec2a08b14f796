//! Core components of the constrained decoding pipeline
//!
//! Leaves first: the tokenizer boundary, the special-token registry, the
//! key tries and their schema-wide index, then the generation pipeline
//! that consumes them all.

pub mod generation;
pub mod index;
pub mod special_tokens;
pub mod tokenizer;
pub mod trie;

pub use generation::{ConstraintConfig, LogitProcessor};
pub use index::SchemaTrieIndex;
pub use special_tokens::SpecialTokenRegistry;
pub use tokenizer::{TokenizerAdapter, VocabTokenizer};
pub use trie::{TokenTrie, TriePath};

#[cfg(feature = "hf-tokenizers")]
pub use tokenizer::HfTokenizer;
