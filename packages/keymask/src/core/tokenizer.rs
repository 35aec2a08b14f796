//! Tokenizer adapter boundary
//!
//! The core never talks to a tokenizer implementation directly. Everything
//! goes through [`TokenizerAdapter`], which is the only integration surface
//! a model runtime must provide besides the sampler hooks. Two adapters ship
//! here: one over the HuggingFace `tokenizers` crate and a deterministic
//! table-driven vocabulary for tests and embedded use.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::domain::error::{ConstraintError, ConstraintResult};

/// Tokenizer operations consumed by the decoding core
///
/// Contract: decoding the concatenation of ids produced by `encode(s)`
/// yields `s` modulo leading-whitespace normalisation. The core never
/// assumes one character per token.
pub trait TokenizerAdapter: Send + Sync {
    /// Encode text into token ids
    ///
    /// `add_special_tokens = false` suppresses model-specific leading
    /// specials (BOS and friends); key bodies are always encoded this way.
    fn encode(&self, text: &str, add_special_tokens: bool) -> ConstraintResult<Vec<u32>>;

    /// Decode a sequence of token ids back into text
    fn decode(&self, ids: &[u32]) -> ConstraintResult<String>;

    /// Decode a single token id into its string piece
    fn decode_token(&self, id: u32) -> ConstraintResult<String> {
        self.decode(std::slice::from_ref(&id))
    }

    /// Number of ids in the vocabulary
    fn vocab_size(&self) -> usize;

    /// End-of-sequence token id, if the tokenizer declares one
    fn eos_token_id(&self) -> Option<u32>;

    /// Short deterministic string identifying this tokenizer build
    ///
    /// Stable across process restarts; used as a cache key component for
    /// the special-token registry and the schema trie index.
    fn fingerprint(&self) -> String;
}

/// Deterministic table-driven tokenizer
///
/// Encodes by greedy longest-match over a fixed piece table. Useful for
/// tests and for embedded settings where a full tokenizer is unavailable.
#[derive(Debug, Clone)]
pub struct VocabTokenizer {
    pieces: Vec<String>,
    ids: std::collections::HashMap<String, u32, ahash::RandomState>,
    max_piece_len: usize,
    eos: Option<u32>,
}

impl VocabTokenizer {
    /// Build a tokenizer from an ordered piece table
    ///
    /// Piece index is token id. Duplicate pieces keep the first id.
    pub fn from_pieces<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<String> = pieces.into_iter().map(Into::into).collect();
        let mut ids =
            std::collections::HashMap::with_hasher(ahash::RandomState::default());
        let mut max_piece_len = 0;
        for (id, piece) in pieces.iter().enumerate() {
            max_piece_len = max_piece_len.max(piece.len());
            ids.entry(piece.clone()).or_insert(id as u32);
        }
        Self {
            pieces,
            ids,
            max_piece_len,
            eos: None,
        }
    }

    /// Builder method declaring an EOS piece already present in the table
    pub fn with_eos_piece(mut self, piece: &str) -> Self {
        self.eos = self.ids.get(piece).copied();
        self
    }

    /// Token id for an exact piece, if present
    pub fn id_of(&self, piece: &str) -> Option<u32> {
        self.ids.get(piece).copied()
    }
}

impl TokenizerAdapter for VocabTokenizer {
    fn encode(&self, text: &str, _add_special_tokens: bool) -> ConstraintResult<Vec<u32>> {
        let mut out = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let upper = self.max_piece_len.min(rest.len());
            let mut matched = None;
            for len in (1..=upper).rev() {
                if !rest.is_char_boundary(len) {
                    continue;
                }
                if let Some(&id) = self.ids.get(&rest[..len]) {
                    matched = Some((id, len));
                    break;
                }
            }
            match matched {
                Some((id, len)) => {
                    out.push(id);
                    rest = &rest[len..];
                }
                None => {
                    return Err(ConstraintError::Tokenizer(format!(
                        "no piece matches input at {:?}",
                        rest.chars().next().unwrap_or_default()
                    )));
                }
            }
        }
        Ok(out)
    }

    fn decode(&self, ids: &[u32]) -> ConstraintResult<String> {
        let mut out = String::new();
        for &id in ids {
            let piece = self.pieces.get(id as usize).ok_or_else(|| {
                ConstraintError::Tokenizer(format!("unknown token id {id}"))
            })?;
            out.push_str(piece);
        }
        Ok(out)
    }

    fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos
    }

    fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        for piece in &self.pieces {
            piece.hash(&mut hasher);
        }
        self.eos.hash(&mut hasher);
        format!("vocab-{:016x}", hasher.finish())
    }
}

/// Adapter over a HuggingFace `tokenizers` tokenizer
#[cfg(feature = "hf-tokenizers")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    eos: Option<u32>,
    fingerprint: String,
}

#[cfg(feature = "hf-tokenizers")]
impl HfTokenizer {
    /// EOS piece spellings probed when the tokenizer does not declare one
    const EOS_CANDIDATES: &'static [&'static str] = &[
        "</s>",
        "<|endoftext|>",
        "<|eot_id|>",
        "<|end|>",
        "<eos>",
        "<|im_end|>",
    ];

    /// Wrap a tokenizer, probing well-known EOS spellings
    pub fn new(inner: tokenizers::Tokenizer) -> Self {
        let eos = Self::EOS_CANDIDATES
            .iter()
            .find_map(|piece| inner.token_to_id(piece));
        let fingerprint = Self::fingerprint_of(&inner);
        Self {
            inner,
            eos,
            fingerprint,
        }
    }

    /// Builder method overriding the EOS token id
    pub fn with_eos(mut self, eos: u32) -> Self {
        self.eos = Some(eos);
        self
    }

    fn fingerprint_of(inner: &tokenizers::Tokenizer) -> String {
        let mut entries: Vec<(String, u32)> = inner.get_vocab(true).into_iter().collect();
        entries.sort();
        let mut hasher = DefaultHasher::new();
        for (piece, id) in &entries {
            piece.hash(&mut hasher);
            id.hash(&mut hasher);
        }
        format!("hf-{:016x}", hasher.finish())
    }
}

#[cfg(feature = "hf-tokenizers")]
impl TokenizerAdapter for HfTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> ConstraintResult<Vec<u32>> {
        self.inner
            .encode(text, add_special_tokens)
            .map(|encoding| encoding.get_ids().to_vec())
            .map_err(|e| ConstraintError::Tokenizer(e.to_string()))
    }

    fn decode(&self, ids: &[u32]) -> ConstraintResult<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| ConstraintError::Tokenizer(e.to_string()))
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}
