//! Option structs for every operation.
//!
//! Each operation takes one explicit options value; there is no argument-shape
//! sniffing. All structs implement `Default`, and the builder-style `with_*` helpers
//! exist for the options callers set most often.

use std::time::Duration;

use bson::Document;
use serde::{Deserialize, Serialize};

/// Options for `find` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Field selection: `{ field: 1 }` picks, `{ field: 0 }` omits.
    pub projection: Option<Document>,
    /// Sort specification, `{ field: 1 | -1, ... }`.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return. `0` means no limit.
    pub limit: Option<usize>,
    /// Accepted for compatibility; never enforced.
    pub timeout: Option<Duration>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for the legacy `update` entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document built from the filter and update when nothing matches.
    pub upsert: bool,
    /// Update every match instead of the first.
    pub multi: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true, multi: false }
    }

    pub fn multi() -> Self {
        Self { upsert: false, multi: true }
    }
}

/// Which image of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    Before,
    /// The document as it is after the update.
    #[default]
    After,
}

/// Options for `find_one_and_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub upsert: bool,
    pub return_document: ReturnDocument,
    /// Projection applied to the returned document.
    pub projection: Option<Document>,
}

/// Options for `remove`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove only the first match.
    pub single: bool,
}

/// Options for `create_index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Explicit index name. Derived from the key pattern when absent.
    pub name: Option<String>,
    /// Reject documents whose key projection already exists.
    #[serde(default)]
    pub unique: bool,
    /// Index format version. Only `1` is supported.
    pub version: Option<i32>,
    /// Not supported.
    #[serde(default)]
    pub drop_dups: bool,
}

impl IndexOptions {
    pub fn unique() -> Self {
        Self { unique: true, ..Self::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Options for `create_collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateCollectionOptions {
    /// Fail if the collection already exists.
    pub strict: bool,
    /// Register the implicit `_id` index when materializing.
    pub auto_index_id: bool,
}

impl Default for CreateCollectionOptions {
    fn default() -> Self {
        Self { strict: false, auto_index_id: true }
    }
}


/// A single operation inside a `bulk_write` call.
///
/// The set is closed; anything a driver offers beyond these variants is unsupported.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

impl WriteModel {
    /// The operation name as a driver spells it, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            WriteModel::InsertOne { .. } => "insertOne",
            WriteModel::UpdateOne { .. } => "updateOne",
            WriteModel::UpdateMany { .. } => "updateMany",
            WriteModel::ReplaceOne { .. } => "replaceOne",
            WriteModel::DeleteOne { .. } => "deleteOne",
            WriteModel::DeleteMany { .. } => "deleteMany",
        }
    }
}
