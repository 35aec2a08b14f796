//! Vocabulary scan for JSON terminal characters
//!
//! One pass over the vocabulary per tokenizer fingerprint collects, for each
//! JSON terminal, the token ids that decode exactly to it, the ids whose
//! decoded text contains it, and the ids whose first non-whitespace decoded
//! character is it. The registry is built lazily and cached process-wide.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::tokenizer::TokenizerAdapter;
use crate::domain::error::ConstraintResult;

/// JSON terminal characters the registry indexes
///
/// Structural terminals plus the characters that can begin a number,
/// boolean or null literal.
pub const JSON_TERMINALS: &[char] = &[
    '"', '\\', ':', ',', '{', '}', '[', ']', '0', '1', '2', '3', '4', '5', '6', '7', '8',
    '9', '-', 't', 'f', 'n',
];

/// Characters that may begin a JSON value
const VALUE_STARTERS: &[char] = &[
    '"', '{', '[', '-', 't', 'f', 'n', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Token id sets collected for one terminal character
#[derive(Debug, Clone, Default)]
pub struct TerminalSets {
    /// Ids whose decoded piece equals the terminal character
    pub exact: Vec<u32>,
    /// Ids whose decoded piece contains the terminal character
    pub containing: Vec<u32>,
    /// Ids whose first non-whitespace decoded character is the terminal
    pub starting: Vec<u32>,
}

/// Per-tokenizer index of JSON terminal tokens
#[derive(Debug)]
pub struct SpecialTokenRegistry {
    fingerprint: String,
    vocab_size: usize,
    eos: Option<u32>,
    by_char: HashMap<char, TerminalSets, RandomState>,
    value_starters: Vec<u32>,
}

static REGISTRY_CACHE: Lazy<DashMap<String, Arc<SpecialTokenRegistry>, RandomState>> =
    Lazy::new(|| DashMap::with_hasher(RandomState::default()));

impl SpecialTokenRegistry {
    /// Scan the vocabulary and build the terminal index
    ///
    /// Tokens the adapter cannot decode are skipped; byte-fallback entries
    /// in merged vocabularies commonly fail piecewise decoding.
    pub fn build(adapter: &dyn TokenizerAdapter) -> ConstraintResult<Self> {
        let vocab_size = adapter.vocab_size();
        let mut by_char: HashMap<char, TerminalSets, RandomState> =
            HashMap::with_hasher(RandomState::default());
        for &ch in JSON_TERMINALS {
            by_char.insert(ch, TerminalSets::default());
        }

        let mut skipped = 0usize;
        for id in 0..vocab_size as u32 {
            let piece = match adapter.decode_token(id) {
                Ok(piece) => piece,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            if piece.is_empty() {
                continue;
            }
            let first = piece.trim_start().chars().next();
            for &ch in JSON_TERMINALS {
                if !piece.contains(ch) && first != Some(ch) {
                    continue;
                }
                let Some(sets) = by_char.get_mut(&ch) else {
                    continue;
                };
                if piece.chars().count() == 1 && piece.starts_with(ch) {
                    sets.exact.push(id);
                }
                if piece.contains(ch) {
                    sets.containing.push(id);
                }
                if first == Some(ch) {
                    sets.starting.push(id);
                }
            }
        }

        let mut value_starters: Vec<u32> = VALUE_STARTERS
            .iter()
            .flat_map(|ch| by_char[ch].starting.iter().copied())
            .collect();
        value_starters.sort_unstable();
        value_starters.dedup();

        log::debug!(
            "special-token scan for {}: {} ids, {} skipped, {} value starters",
            adapter.fingerprint(),
            vocab_size,
            skipped,
            value_starters.len()
        );

        Ok(Self {
            fingerprint: adapter.fingerprint(),
            vocab_size,
            eos: adapter.eos_token_id(),
            by_char,
            value_starters,
        })
    }

    /// Fetch or build the registry for a tokenizer, via the process cache
    ///
    /// Lookups never serialise; the exclusive section is the map insert.
    pub fn for_tokenizer(adapter: &dyn TokenizerAdapter) -> ConstraintResult<Arc<Self>> {
        let fingerprint = adapter.fingerprint();
        if let Some(cached) = REGISTRY_CACHE.get(&fingerprint) {
            log::debug!("special-token registry cache hit for {fingerprint}");
            return Ok(Arc::clone(cached.value()));
        }
        let built = Arc::new(Self::build(adapter)?);
        log::debug!("special-token registry cache miss for {fingerprint}");
        REGISTRY_CACHE.insert(fingerprint, Arc::clone(&built));
        Ok(built)
    }

    /// Ids decoding exactly to the terminal character
    pub fn exact(&self, ch: char) -> &[u32] {
        self.by_char.get(&ch).map(|s| s.exact.as_slice()).unwrap_or(&[])
    }

    /// Ids whose decoded piece contains the terminal character
    pub fn containing(&self, ch: char) -> &[u32] {
        self.by_char
            .get(&ch)
            .map(|s| s.containing.as_slice())
            .unwrap_or(&[])
    }

    /// Ids whose first non-whitespace decoded character is the terminal
    pub fn starting(&self, ch: char) -> &[u32] {
        self.by_char
            .get(&ch)
            .map(|s| s.starting.as_slice())
            .unwrap_or(&[])
    }

    /// Ids that can begin a JSON value (modulo leading whitespace)
    pub fn value_starter_tokens(&self) -> &[u32] {
        &self.value_starters
    }

    /// Tokens admissible for closing a key's quote
    ///
    /// Prefers exact `"` tokens. When the tokenizer has none, falls back to
    /// the `top_k` highest-scoring ids under the current logits whose
    /// decoded text contains `"`, so at least one high-probability closing
    /// option is always available.
    pub fn closing_quote_tokens(&self, logits: &[f32], top_k: usize) -> Vec<u32> {
        let exact = self.exact('"');
        if !exact.is_empty() {
            return exact.to_vec();
        }
        let mut candidates: Vec<u32> = self.containing('"').to_vec();
        candidates.sort_by(|&a, &b| {
            let score_a = logits.get(a as usize).copied().unwrap_or(f32::NEG_INFINITY);
            let score_b = logits.get(b as usize).copied().unwrap_or(f32::NEG_INFINITY);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        candidates
    }

    /// Tokenizer fingerprint this registry was built from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Vocabulary size observed at scan time
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// End-of-sequence token id, if known
    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos
    }
}
