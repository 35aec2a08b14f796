//! Domain types shared across the decoding core

pub mod error;
pub mod schema;

pub use error::{ConstraintError, ConstraintResult};
pub use schema::{NodeId, SchemaKind, SchemaNode};
