//! One token trie per object node of a schema tree
//!
//! Built once per (tokenizer fingerprint, schema) pair and cached in a
//! bounded process-wide LRU. Tries are immutable after construction and
//! shared by reference across concurrent generations.

use std::num::NonZeroUsize;
use std::sync::Arc;

use ahash::RandomState;
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::tokenizer::TokenizerAdapter;
use super::trie::TokenTrie;
use crate::domain::error::{ConstraintError, ConstraintResult};
use crate::domain::schema::{NodeId, SchemaKind, SchemaNode};

/// Default ceiling for the process-wide index cache
pub const DEFAULT_INDEX_CACHE_MAX: usize = 100;

/// Tries for every object node reachable from one schema root
#[derive(Debug)]
pub struct SchemaTrieIndex {
    fingerprint: String,
    schema_hash: u64,
    tries: std::collections::HashMap<NodeId, Arc<TokenTrie>, RandomState>,
}

static INDEX_CACHE: Lazy<Mutex<LruCache<(String, u64), Arc<SchemaTrieIndex>>>> =
    Lazy::new(|| {
        let cap = NonZeroUsize::new(DEFAULT_INDEX_CACHE_MAX)
            .unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(cap))
    });

impl SchemaTrieIndex {
    /// Build tries for every object node in the schema tree
    ///
    /// Fails with [`ConstraintError::EmptyConstraints`] on any object node
    /// that declares no keys, before any generation can start.
    pub fn build(
        root: &Arc<SchemaNode>,
        adapter: &dyn TokenizerAdapter,
    ) -> ConstraintResult<Self> {
        let mut index = Self {
            fingerprint: adapter.fingerprint(),
            schema_hash: root.structural_hash(),
            tries: std::collections::HashMap::with_hasher(RandomState::default()),
        };
        index.visit(root, adapter)?;
        log::debug!(
            "built trie index for schema {:016x}: {} object nodes",
            index.schema_hash,
            index.tries.len()
        );
        Ok(index)
    }

    fn visit(
        &mut self,
        node: &Arc<SchemaNode>,
        adapter: &dyn TokenizerAdapter,
    ) -> ConstraintResult<()> {
        match node.kind() {
            SchemaKind::Object => {
                let id = node.identity();
                if self.tries.contains_key(&id) {
                    // shared subtree, trie already built
                    return Ok(());
                }
                if node.properties().is_empty() {
                    return Err(ConstraintError::EmptyConstraints);
                }
                let trie = TokenTrie::for_keys(node.declared_keys(), adapter)?;
                self.tries.insert(id, Arc::new(trie));
                for child in node.properties().values() {
                    self.visit(child, adapter)?;
                }
                Ok(())
            }
            SchemaKind::Array => match node.items() {
                Some(items) => self.visit(items, adapter),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Fetch or build the index for a schema through the process cache
    ///
    /// Lookup holds the lock only for the map probe; a miss builds outside
    /// the exclusive section and re-locks for the insert. Two racing builds
    /// produce observationally equivalent indexes, so last-write-wins is
    /// sound.
    pub fn cached(
        root: &Arc<SchemaNode>,
        adapter: &dyn TokenizerAdapter,
        cache_max: usize,
    ) -> ConstraintResult<Arc<Self>> {
        let key = (adapter.fingerprint(), root.structural_hash());
        {
            let mut cache = INDEX_CACHE.lock();
            if let Some(cap) = NonZeroUsize::new(cache_max) {
                if cache.cap() != cap {
                    cache.resize(cap);
                }
            }
            if let Some(hit) = cache.get(&key) {
                log::debug!("trie index cache hit for schema {:016x}", key.1);
                return Ok(Arc::clone(hit));
            }
        }
        let built = Arc::new(Self::build(root, adapter)?);
        log::debug!("trie index cache miss for schema {:016x}", key.1);
        INDEX_CACHE.lock().put(key, Arc::clone(&built));
        Ok(built)
    }

    /// Trie for an object node, by structural identity
    pub fn trie_for(&self, id: NodeId) -> Option<&Arc<TokenTrie>> {
        self.tries.get(&id)
    }

    /// Tokenizer fingerprint this index was built against
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Structural hash of the schema root
    pub fn schema_hash(&self) -> u64 {
        self.schema_hash
    }

    /// Number of object nodes indexed
    pub fn len(&self) -> usize {
        self.tries.len()
    }

    /// Whether the schema contained no object nodes at all
    pub fn is_empty(&self) -> bool {
        self.tries.is_empty()
    }
}
