//! Prefix tree over token-id sequences for one object's declared keys
//!
//! Every declared key is inserted as its body encoding (no leading space,
//! no BOS). During decoding the processor walks a [`TriePath`] through the
//! tree one sampled token at a time and asks which edges may come next.

use std::collections::BTreeMap;

use super::tokenizer::TokenizerAdapter;
use crate::domain::error::{ConstraintError, ConstraintResult};

#[derive(Debug, Clone, Default)]
struct TrieNode {
    /// Outgoing edges, keyed by token id. BTreeMap keeps edge enumeration
    /// deterministic.
    children: BTreeMap<u32, usize>,
    /// Index into `keys` when a declared key ends at this node
    terminal: Option<usize>,
}

/// Token trie for the declared keys of one schema object node
#[derive(Debug, Clone)]
pub struct TokenTrie {
    nodes: Vec<TrieNode>,
    keys: Vec<String>,
}

/// Current position while emitting a key
///
/// Holds the token ids consumed since the key's opening quote and the trie
/// node they lead to. `node` is `None` once the path has fallen off the
/// trie, which a correctly applied hard mask prevents.
#[derive(Debug, Clone)]
pub struct TriePath {
    tokens: Vec<u32>,
    node: Option<usize>,
}

impl TriePath {
    /// Fresh path at the trie root
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            node: Some(0),
        }
    }

    /// Reset back to the root
    pub fn reset(&mut self) {
        self.tokens.clear();
        self.node = Some(0);
    }

    /// Token ids consumed since the key opened
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    /// Whether the path has fallen off the trie
    pub fn is_off_trie(&self) -> bool {
        self.node.is_none()
    }
}

impl Default for TriePath {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTrie {
    /// Build a trie for the given declared keys
    ///
    /// Each key is encoded with the body rule (`add_special_tokens = false`)
    /// and validated: empty encodings, keys with control characters, tokens
    /// that do not decode to a substring of the key, and tokens whose piece
    /// contains an unescaped `"` or `\` are all rejected.
    pub fn for_keys<I, S>(keys: I, adapter: &dyn TokenizerAdapter) -> ConstraintResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self {
            nodes: vec![TrieNode::default()],
            keys: Vec::new(),
        };
        for key in keys {
            let key = key.as_ref();
            let ids = Self::validated_encoding(key, adapter)?;
            trie.insert(key, &ids)?;
        }
        Ok(trie)
    }

    fn validated_encoding(
        key: &str,
        adapter: &dyn TokenizerAdapter,
    ) -> ConstraintResult<Vec<u32>> {
        if key.chars().any(char::is_control) {
            return Err(ConstraintError::InvalidKey {
                key: key.to_string(),
                reason: "contains control characters".to_string(),
            });
        }
        let ids = adapter.encode(key, false)?;
        if ids.is_empty() {
            return Err(ConstraintError::InvalidKey {
                key: key.to_string(),
                reason: "encodes to the empty token sequence".to_string(),
            });
        }
        for &id in &ids {
            let piece = adapter.decode_token(id)?;
            if !key.contains(&piece) {
                return Err(ConstraintError::InvalidKey {
                    key: key.to_string(),
                    reason: format!("token {id} decodes to {piece:?}, not a substring"),
                });
            }
            if piece.contains('"') || piece.contains('\\') {
                return Err(ConstraintError::InvalidKey {
                    key: key.to_string(),
                    reason: format!("token {id} piece {piece:?} would break escaping"),
                });
            }
        }
        Ok(ids)
    }

    fn insert(&mut self, key: &str, ids: &[u32]) -> ConstraintResult<()> {
        let mut node = 0usize;
        for &id in ids {
            node = match self.nodes[node].children.get(&id) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(id, next);
                    next
                }
            };
        }
        if let Some(existing) = self.nodes[node].terminal {
            // distinct keys must not share a terminal
            if self.keys[existing] != key {
                return Err(ConstraintError::InvalidKey {
                    key: key.to_string(),
                    reason: format!(
                        "token sequence collides with key {:?}",
                        self.keys[existing]
                    ),
                });
            }
            return Ok(());
        }
        self.keys.push(key.to_string());
        self.nodes[node].terminal = Some(self.keys.len() - 1);
        Ok(())
    }

    /// Follow one token edge, returning whether it existed
    ///
    /// On a missing edge the path is left unchanged, as the caller needs
    /// the pre-failure position for error reporting.
    pub fn advance(&self, path: &mut TriePath, token: u32) -> bool {
        let Some(node) = path.node else {
            return false;
        };
        match self.nodes[node].children.get(&token) {
            Some(&next) => {
                path.tokens.push(token);
                path.node = Some(next);
                true
            }
            None => false,
        }
    }

    /// Token ids admissible as the next step from this path
    pub fn allowed_next(&self, path: &TriePath) -> Vec<u32> {
        match path.node {
            Some(node) => self.nodes[node].children.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Whether a declared key ends exactly at this path
    pub fn at_terminal(&self, path: &TriePath) -> bool {
        path.node
            .is_some_and(|node| self.nodes[node].terminal.is_some())
    }

    /// The declared key ending at this path, if any
    pub fn key_at(&self, path: &TriePath) -> Option<&str> {
        let node = path.node?;
        let key = self.nodes[node].terminal?;
        Some(&self.keys[key])
    }

    /// All declared keys inserted into this trie
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Number of declared keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// First token id of each declared key for which `include` holds
    ///
    /// Feeds the expect-key allow-set: the first tokens of every key that
    /// has not been emitted yet in the current object.
    pub fn first_tokens<F>(&self, include: F) -> Vec<u32>
    where
        F: Fn(&str) -> bool,
    {
        let mut out = Vec::new();
        for (&token, &child) in &self.nodes[0].children {
            if self.subtree_has_key(child, &include) {
                out.push(token);
            }
        }
        out
    }

    fn subtree_has_key<F>(&self, node: usize, include: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        if let Some(key) = self.nodes[node].terminal {
            if include(&self.keys[key]) {
                return true;
            }
        }
        self.nodes[node]
            .children
            .values()
            .any(|&child| self.subtree_has_key(child, include))
    }
}
