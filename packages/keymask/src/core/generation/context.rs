//! Schema-space mirror of the bracket stack
//!
//! Each frame records which schema node (if any) governs the container the
//! generation is currently inside. Frames without a node disable key
//! constraints until popped; structural syntax stays enforced.

use std::collections::HashSet;
use std::sync::Arc;

use ahash::RandomState;

use super::state_machine::Container;
use crate::domain::schema::{SchemaKind, SchemaNode};

/// One open container in schema space
#[derive(Debug, Clone)]
pub enum ContextFrame {
    /// Object frame, with its schema node when known and the keys already
    /// emitted inside it
    Object {
        /// Governing schema node; `None` disables key constraints
        node: Option<Arc<SchemaNode>>,
        /// Keys completed in this object so far
        seen: HashSet<String, RandomState>,
    },
    /// Array frame with an optional element schema
    Array {
        /// Schema every element descends into, when known
        element: Option<Arc<SchemaNode>>,
    },
}

impl ContextFrame {
    fn known_object(node: Arc<SchemaNode>) -> Self {
        Self::Object {
            node: Some(node),
            seen: HashSet::with_hasher(RandomState::default()),
        }
    }

    fn unknown_object() -> Self {
        Self::Object {
            node: None,
            seen: HashSet::with_hasher(RandomState::default()),
        }
    }

    fn array(element: Option<Arc<SchemaNode>>) -> Self {
        Self::Array { element }
    }

    /// Schema node of an object frame, if known
    pub fn object_node(&self) -> Option<&Arc<SchemaNode>> {
        match self {
            Self::Object { node, .. } => node.as_ref(),
            Self::Array { .. } => None,
        }
    }

    /// Whether the frame is an object with a known schema
    pub fn is_known_object(&self) -> bool {
        matches!(self, Self::Object { node: Some(_), .. })
    }

    /// Keys already emitted in this object
    pub fn seen_keys(&self) -> Option<&HashSet<String, RandomState>> {
        match self {
            Self::Object { seen, .. } => Some(seen),
            Self::Array { .. } => None,
        }
    }

    /// Record a completed key
    pub fn mark_seen(&mut self, key: &str) {
        if let Self::Object { seen, .. } = self {
            seen.insert(key.to_string());
        }
    }

    /// Whether the object may legally close now (required ⊆ seen)
    ///
    /// Unknown frames and arrays may always close.
    pub fn may_end(&self) -> bool {
        match self {
            Self::Object {
                node: Some(node),
                seen,
            } => node.required().iter().all(|key| seen.contains(key)),
            _ => true,
        }
    }
}

/// Stack of context frames, pushed on `{`/`[` and popped on `}`/`]`
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    /// Empty stack
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Drop all frames
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Current depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no container is open
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost frame
    pub fn top(&self) -> Option<&ContextFrame> {
        self.frames.last()
    }

    /// Innermost frame, mutably
    pub fn top_mut(&mut self) -> Option<&mut ContextFrame> {
        self.frames.last_mut()
    }

    /// Pop the innermost frame
    pub fn pop(&mut self) -> Option<ContextFrame> {
        self.frames.pop()
    }

    /// Push the frame for a just-opened container
    ///
    /// The child schema is resolved in priority order: the schema root when
    /// this is the outermost container, the pending key's child inside a
    /// known object, the element schema inside an array. A kind mismatch or
    /// unresolvable child pushes an unknown frame, disabling key
    /// constraints until it is popped.
    pub fn push_for_open(
        &mut self,
        kind: Container,
        pending_key: Option<&str>,
        root: Option<&Arc<SchemaNode>>,
    ) -> &ContextFrame {
        let child = if self.frames.is_empty() {
            root.cloned()
        } else {
            match (pending_key, self.frames.last()) {
                (Some(key), Some(ContextFrame::Object { node: Some(node), .. })) => {
                    node.property(key).cloned()
                }
                (None, Some(ContextFrame::Array { element })) => element.clone(),
                _ => None,
            }
        };

        let frame = match kind {
            Container::Object => match child {
                Some(node) if node.kind() == SchemaKind::Object => {
                    ContextFrame::known_object(node)
                }
                _ => ContextFrame::unknown_object(),
            },
            Container::Array => match child {
                Some(node) if node.kind() == SchemaKind::Array => {
                    ContextFrame::array(node.items().cloned())
                }
                _ => ContextFrame::array(None),
            },
        };

        let idx = self.frames.len();
        self.frames.push(frame);
        &self.frames[idx]
    }
}
