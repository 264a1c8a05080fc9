//! Driver-shaped result values.
//!
//! Each write returns a typed result carrying the per-operation counts and the legacy
//! `result` summary (`{ ok, n, nModified }`). The structs serialize with camelCase
//! keys so that their JSON/BSON form matches what driver callers inspect.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde::Serialize;

/// The legacy `{ ok, n }` summary every write result carries.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    /// `1` for a successful call.
    pub ok: i32,
    /// Number of documents the write affected.
    pub n: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_modified: Option<u64>,
}

impl WriteSummary {
    pub fn ok(n: u64) -> Self {
        Self { ok: 1, n, n_modified: None }
    }

    pub fn modified(n: u64, n_modified: u64) -> Self {
        Self { ok: 1, n, n_modified: Some(n_modified) }
    }
}

/// Result of `insert_one`.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub inserted_id: Bson,
    /// A copy of the stored document.
    pub ops: Vec<Document>,
    pub result: WriteSummary,
}

/// Result of `insert` and `insert_many`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResult {
    pub inserted_count: u64,
    /// Identifier of each inserted document keyed by its position in the batch.
    pub inserted_ids: BTreeMap<usize, Bson>,
    /// Copies of the stored documents, in batch order.
    pub ops: Vec<Document>,
    pub result: WriteSummary,
}

/// Result of the `update` family, `replace_one` and `save`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Bson>,
    /// The inserted document when the write took the upsert branch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<Document>,
    pub result: WriteSummary,
}

/// Result of `delete_one`, `delete_many` and `remove`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
    /// The removed documents.
    pub ops: Vec<Document>,
    pub result: WriteSummary,
}

/// The `lastErrorObject` of a find-and-modify envelope.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastErrorObject {
    /// `1` if a document was updated or inserted.
    pub n: u64,
    /// Whether a pre-image existed.
    pub updated_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted: Option<Bson>,
}

/// Result of `find_one_and_update`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FindAndModifyResult {
    pub ok: i32,
    /// The pre- or post-image, or `None` when nothing matched and no upsert happened.
    pub value: Option<Document>,
    pub last_error_object: LastErrorObject,
}

/// Result of `bulk_write` and of executing a bulk builder.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub deleted_count: u64,
    /// Upserted identifiers keyed by the position of the operation that produced them.
    pub upserted_ids: BTreeMap<usize, Bson>,
    /// Inserted and upserted documents, in operation order.
    pub ops: Vec<Document>,
    pub result: WriteSummary,
}

impl BulkWriteResult {
    /// Folds the outcome of operation `position` into the aggregate.
    pub fn absorb(&mut self, position: usize, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted(inserted) => {
                self.inserted_count += inserted.inserted_count;
                self.ops.extend(inserted.ops);
            }
            WriteOutcome::Updated(updated) => {
                self.matched_count += updated.matched_count;
                self.modified_count += updated.modified_count;
                self.upserted_count += updated.upserted_count;
                if let Some(id) = updated.upserted_id {
                    self.upserted_ids.insert(position, id);
                }
                self.ops.extend(updated.ops);
            }
            WriteOutcome::Deleted(deleted) => {
                self.deleted_count += deleted.deleted_count;
            }
        }

        let n = self.inserted_count + self.upserted_count + self.modified_count + self.deleted_count;
        self.result = WriteSummary::modified(n, self.modified_count);
    }
}

/// The outcome of a single operation inside a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Inserted(InsertManyResult),
    Updated(UpdateResult),
    Deleted(DeleteResult),
}
