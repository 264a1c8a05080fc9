//! Index descriptors.
//!
//! The engine models indexes for uniqueness enforcement only; a descriptor records the
//! key pattern, the namespace it belongs to and whether it is unique. The serialized
//! shape matches what `indexInformation({ full: true })` reports.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Name of the implicit primary key index.
pub const ID_INDEX_NAME: &str = "_id_";

/// A declared index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    /// Index format version. Only version 1 is modelled.
    pub v: i32,
    /// Ordered mapping of field path to direction.
    pub key: Document,
    /// Index name, unique within its namespace.
    pub name: String,
    /// `database.collection` the index belongs to.
    pub ns: String,
    /// Whether the index rejects duplicate key projections.
    pub unique: bool,
}

impl IndexDescriptor {
    /// Creates the implicit unique `_id` index for a namespace.
    pub fn primary(ns: impl Into<String>) -> Self {
        Self {
            v: 1,
            key: bson::doc! { "_id": 1 },
            name: ID_INDEX_NAME.to_string(),
            ns: ns.into(),
            unique: true,
        }
    }

    /// Returns the indexed field paths, in key order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.key.keys().map(String::as_str)
    }

    /// Returns `true` for the implicit `_id` index.
    pub fn is_primary(&self) -> bool {
        self.name == ID_INDEX_NAME
    }
}

/// Derives the conventional index name from a key pattern: `field_direction` pairs
/// joined by underscores (`{ a: 1, b: -1 }` becomes `a_1_b_-1`).
pub fn default_index_name(key: &Document) -> String {
    key.iter()
        .map(|(field, direction)| format!("{field}_{}", direction_label(direction)))
        .collect::<Vec<_>>()
        .join("_")
}

fn direction_label(direction: &Bson) -> String {
    match direction {
        Bson::Int32(value) => value.to_string(),
        Bson::Int64(value) => value.to_string(),
        Bson::Double(value) if value.fract() == 0.0 => (*value as i64).to_string(),
        Bson::String(value) => value.clone(),
        other => other.to_string(),
    }
}
