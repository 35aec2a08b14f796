//! Post-generation key-set validation
//!
//! Parses the finished output as JSON and checks that every object's key
//! set is a subset of its matching schema node's declared keys. Value
//! types are not checked; mismatched shapes simply stop the descent. No
//! repair is attempted.

use serde_json::Value;

use crate::domain::error::{ConstraintError, ConstraintResult};
use crate::domain::schema::{SchemaKind, SchemaNode};

/// Validate generated output against a schema
///
/// Returns the unmodified output on success so callers can hand it on
/// without re-owning it.
pub fn validate<'a>(output: &'a str, schema: &SchemaNode) -> ConstraintResult<&'a str> {
    let value: Value = serde_json::from_str(output).map_err(|e| {
        ConstraintError::SchemaViolation {
            reason: format!("output is not valid JSON: {e}"),
        }
    })?;
    check(&value, schema, "$")?;
    Ok(output)
}

fn check(value: &Value, node: &SchemaNode, path: &str) -> ConstraintResult<()> {
    match (value, node.kind()) {
        (Value::Object(entries), SchemaKind::Object) => {
            for (key, child_value) in entries {
                match node.property(key) {
                    Some(child_node) => {
                        let child_path = format!("{path}.{key}");
                        check(child_value, child_node, &child_path)?;
                    }
                    None => {
                        return Err(ConstraintError::SchemaViolation {
                            reason: format!("undeclared key {key:?} at {path}"),
                        });
                    }
                }
            }
            Ok(())
        }
        (Value::Array(elements), SchemaKind::Array) => {
            if let Some(items) = node.items() {
                for (i, element) in elements.iter().enumerate() {
                    let child_path = format!("{path}[{i}]");
                    check(element, items, &child_path)?;
                }
            }
            Ok(())
        }
        // shape mismatches and scalar values carry no key constraints
        _ => Ok(()),
    }
}
