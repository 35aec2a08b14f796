//! Schema tree describing the JSON shape a generation must conform to
//!
//! Nodes are immutable once built and shared by reference (`Arc`) across the
//! trie index and the context stack. Identity is structural: two nodes with
//! the same shape hash to the same [`NodeId`], so shared subtrees reuse the
//! same key trie.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;

use super::error::{ConstraintError, ConstraintResult};

/// The JSON shape class of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Object with a declared key set
    Object,
    /// Array with an optional element schema
    Array,
    /// String value
    String,
    /// Number value (integer or float)
    Number,
    /// Integer value
    Integer,
    /// Boolean value
    Boolean,
    /// Null value
    Null,
    /// Any JSON value; disables constraints below this point
    Any,
}

/// Stable structural identity of a schema node
///
/// Derived from the node's shape, so it is identical for structurally equal
/// nodes across separately built trees and across process restarts. Used as
/// the trie index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// A node in the schema tree
///
/// Built once through the constructors below, then shared immutably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    kind: SchemaKind,
    properties: BTreeMap<String, Arc<SchemaNode>>,
    required: BTreeSet<String>,
    items: Option<Arc<SchemaNode>>,
    structural_hash: u64,
}

impl SchemaNode {
    fn finish(
        kind: SchemaKind,
        properties: BTreeMap<String, Arc<SchemaNode>>,
        required: BTreeSet<String>,
        items: Option<Arc<SchemaNode>>,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        for (key, child) in &properties {
            key.hash(&mut hasher);
            child.structural_hash.hash(&mut hasher);
        }
        for key in &required {
            key.hash(&mut hasher);
        }
        if let Some(items) = &items {
            items.structural_hash.hash(&mut hasher);
        }
        let structural_hash = hasher.finish();

        Self {
            kind,
            properties,
            required,
            items,
            structural_hash,
        }
    }

    fn leaf(kind: SchemaKind) -> Self {
        Self::finish(kind, BTreeMap::new(), BTreeSet::new(), None)
    }

    /// String-valued node
    pub fn string() -> Self {
        Self::leaf(SchemaKind::String)
    }

    /// Number-valued node
    pub fn number() -> Self {
        Self::leaf(SchemaKind::Number)
    }

    /// Integer-valued node
    pub fn integer() -> Self {
        Self::leaf(SchemaKind::Integer)
    }

    /// Boolean-valued node
    pub fn boolean() -> Self {
        Self::leaf(SchemaKind::Boolean)
    }

    /// Null-valued node
    pub fn null() -> Self {
        Self::leaf(SchemaKind::Null)
    }

    /// Unconstrained node
    pub fn any() -> Self {
        Self::leaf(SchemaKind::Any)
    }

    /// Object node with the given declared keys, none required
    pub fn object<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = (S, SchemaNode)>,
        S: Into<String>,
    {
        let properties = properties
            .into_iter()
            .map(|(key, node)| (key.into(), Arc::new(node)))
            .collect();
        Self::finish(SchemaKind::Object, properties, BTreeSet::new(), None)
    }

    /// Array node with a known element schema
    pub fn array(items: SchemaNode) -> Self {
        Self::finish(
            SchemaKind::Array,
            BTreeMap::new(),
            BTreeSet::new(),
            Some(Arc::new(items)),
        )
    }

    /// Array node whose element shape is unknown
    pub fn array_unknown() -> Self {
        Self::leaf(SchemaKind::Array)
    }

    /// Builder method marking a subset of declared keys as required
    ///
    /// Keys not present in `properties` are ignored.
    pub fn with_required<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required = keys
            .into_iter()
            .map(Into::into)
            .filter(|key| self.properties.contains_key(key))
            .collect();
        Self::finish(self.kind, self.properties, required, self.items)
    }

    /// Builder method marking every declared key as required
    pub fn with_all_required(self) -> Self {
        let required = self.properties.keys().cloned().collect();
        Self::finish(self.kind, self.properties, required, self.items)
    }

    /// Shape class of this node
    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// Declared properties of an object node (empty for other kinds)
    pub fn properties(&self) -> &BTreeMap<String, Arc<SchemaNode>> {
        &self.properties
    }

    /// Required key set of an object node
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Element schema of an array node, if declared
    pub fn items(&self) -> Option<&Arc<SchemaNode>> {
        self.items.as_ref()
    }

    /// Declared key strings of an object node
    pub fn declared_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Child schema for a declared key
    pub fn property(&self, key: &str) -> Option<&Arc<SchemaNode>> {
        self.properties.get(key)
    }

    /// Structural identity of this node
    pub fn identity(&self) -> NodeId {
        NodeId(self.structural_hash)
    }

    /// Structural hash of this node, stable across processes
    pub fn structural_hash(&self) -> u64 {
        self.structural_hash
    }

    /// Load a schema tree from a JSON-Schema-like value
    ///
    /// Recognises the draft-07 subset the core consumes: `type`,
    /// `properties`, `required` and `items`. A value with `properties` but
    /// no `type` is treated as an object; anything unrecognised maps to
    /// [`SchemaKind::Any`].
    pub fn from_value(value: &Value) -> ConstraintResult<SchemaNode> {
        let Some(map) = value.as_object() else {
            return Err(ConstraintError::SchemaViolation {
                reason: "schema must be a JSON object".to_string(),
            });
        };

        let declared_type = map.get("type").and_then(Value::as_str);
        let kind = match declared_type {
            Some("object") => SchemaKind::Object,
            Some("array") => SchemaKind::Array,
            Some("string") => SchemaKind::String,
            Some("number") => SchemaKind::Number,
            Some("integer") => SchemaKind::Integer,
            Some("boolean") => SchemaKind::Boolean,
            Some("null") => SchemaKind::Null,
            None if map.contains_key("properties") => SchemaKind::Object,
            None if map.contains_key("items") => SchemaKind::Array,
            _ => SchemaKind::Any,
        };

        match kind {
            SchemaKind::Object => {
                let mut properties = BTreeMap::new();
                if let Some(props) = map.get("properties").and_then(Value::as_object) {
                    for (key, child) in props {
                        properties.insert(key.clone(), Arc::new(Self::from_value(child)?));
                    }
                }
                let required = map
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|keys| {
                        keys.iter()
                            .filter_map(Value::as_str)
                            .filter(|key| properties.contains_key(*key))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Self::finish(kind, properties, required, None))
            }
            SchemaKind::Array => {
                let items = map
                    .get("items")
                    .map(Self::from_value)
                    .transpose()?
                    .map(Arc::new);
                Ok(Self::finish(kind, BTreeMap::new(), BTreeSet::new(), items))
            }
            _ => Ok(Self::leaf(kind)),
        }
    }
}

impl Hash for SchemaNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structural_hash.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_schema() -> SchemaNode {
        SchemaNode::object([
            ("name", SchemaNode::string()),
            ("age", SchemaNode::integer()),
            ("email", SchemaNode::string()),
        ])
        .with_all_required()
    }

    #[test]
    fn test_object_construction() {
        let schema = profile_schema();
        assert_eq!(schema.kind(), SchemaKind::Object);
        assert_eq!(schema.declared_keys().count(), 3);
        assert!(schema.required().contains("age"));
        assert_eq!(schema.property("name").unwrap().kind(), SchemaKind::String);
    }

    #[test]
    fn test_structural_identity_is_stable() {
        let a = profile_schema();
        let b = profile_schema();
        assert_eq!(a.identity(), b.identity());

        let c = SchemaNode::object([("name", SchemaNode::string())]);
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_required_only_accepts_declared_keys() {
        let schema = SchemaNode::object([("name", SchemaNode::string())])
            .with_required(["name", "phantom"]);
        assert!(schema.required().contains("name"));
        assert!(!schema.required().contains("phantom"));
    }

    #[test]
    fn test_from_value_draft07_subset() {
        let value = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {
                        "firstName": {"type": "string"},
                        "lastName": {"type": "string"}
                    },
                    "required": ["firstName"]
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["user"]
        });

        let schema = SchemaNode::from_value(&value).expect("schema should load");
        assert_eq!(schema.kind(), SchemaKind::Object);
        assert!(schema.required().contains("user"));

        let user = schema.property("user").unwrap();
        assert_eq!(user.kind(), SchemaKind::Object);
        assert!(user.required().contains("firstName"));

        let tags = schema.property("tags").unwrap();
        assert_eq!(tags.kind(), SchemaKind::Array);
        assert_eq!(tags.items().unwrap().kind(), SchemaKind::String);
    }

    #[test]
    fn test_from_value_untyped_maps_to_any() {
        let schema = SchemaNode::from_value(&json!({"description": "whatever"})).unwrap();
        assert_eq!(schema.kind(), SchemaKind::Any);
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        assert!(SchemaNode::from_value(&json!("string")).is_err());
    }
}
