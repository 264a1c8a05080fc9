//! Ordered and unordered bulk builders.
//!
//! Operations are staged on a [`BulkOperation`] and nothing runs until
//! [`BulkOperation::execute`]. Each staged operation is scheduled as its own write,
//! so removals re-query the store when they run rather than when they were staged.
//! Builder calls outside the modelled subset fail when they are made, so nothing is
//! staged for them.
//!
//! # Example
//!
//! ```ignore
//! let mut bulk = users.initialize_ordered_bulk_op();
//! bulk.insert(doc! { "name": "Carol" });
//! bulk.find(doc! { "name": "Alice" }).upsert().update_one(doc! { "$set": { "admin": true } });
//! bulk.find(doc! { "name": "Bob" }).remove_one();
//!
//! let result = bulk.execute().await?;
//! ```

use bson::Document;
use futures::future::join_all;
use tracing::debug;

use docmock_core::{
    error::{DocMockError, DocMockResult},
    options::WriteModel,
    results::BulkWriteResult,
};

use crate::{collection::Collection, latency::Pending};

/// A batch of staged write operations.
#[derive(Debug)]
#[must_use = "a bulk operation does nothing until executed"]
pub struct BulkOperation {
    collection: Collection,
    ordered: bool,
    staged: Vec<WriteModel>,
}

impl BulkOperation {
    pub(crate) fn new(collection: Collection, ordered: bool) -> Self {
        Self { collection, ordered, staged: Vec::new() }
    }

    pub(crate) fn from_models(collection: Collection, ordered: bool, models: Vec<WriteModel>) -> Self {
        Self { collection, ordered, staged: models }
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Stages an insert.
    pub fn insert(&mut self, document: Document) -> &mut Self {
        self.staged.push(WriteModel::InsertOne { document });
        self
    }

    /// Selects the documents the next staged update or removal applies to.
    pub fn find(&mut self, filter: Document) -> FindOperators<'_> {
        FindOperators { bulk: self, filter, upsert: false }
    }

    /// Runs the staged operations.
    ///
    /// Ordered batches run one operation at a time and stop at the first failure.
    /// Unordered batches schedule every operation at once and wait for all of them.
    /// Either way the first failure, in staging order, is returned and committed
    /// operations are not rolled back. A duplicate key reports the position of the
    /// failing operation.
    pub fn execute(self) -> Pending<BulkWriteResult> {
        if self.staged.is_empty() {
            return Pending::ready(Err(DocMockError::InvalidArgument(
                "Invalid Operation, no operations specified".into(),
            )));
        }

        debug!(
            target: "docmock::bulk",
            namespace = %self.collection.namespace(),
            ordered = self.ordered,
            count = self.staged.len(),
            "Execute bulk operation"
        );

        let Self { collection, ordered, staged } = self;

        if ordered {
            Pending::new(async move {
                let mut result = BulkWriteResult::default();
                for (position, operation) in staged.into_iter().enumerate() {
                    let outcome = collection.write_model(operation).await;
                    result.absorb(position, outcome.map_err(|err| at_position(err, position))?);
                }
                Ok(result)
            })
        } else {
            let pending = staged
                .into_iter()
                .map(|operation| collection.write_model(operation))
                .collect::<Vec<_>>();

            Pending::new(async move {
                let outcomes = join_all(pending).await;

                let mut result = BulkWriteResult::default();
                for (position, outcome) in outcomes.into_iter().enumerate() {
                    result.absorb(position, outcome.map_err(|err| at_position(err, position))?);
                }
                Ok(result)
            })
        }
    }
}

fn at_position(err: DocMockError, position: usize) -> DocMockError {
    match err {
        DocMockError::DuplicateKey { namespace, index_name, .. } => {
            DocMockError::DuplicateKey { namespace, index_name, index: position }
        }
        other => other,
    }
}

fn unsupported(call: &str) -> DocMockError {
    DocMockError::NotSupported(format!("bulk operation '{call}'"))
}

/// Stages operations on the documents selected by [`BulkOperation::find`].
#[derive(Debug)]
#[must_use = "nothing is staged until an update or removal is chosen"]
pub struct FindOperators<'a> {
    bulk: &'a mut BulkOperation,
    filter: Document,
    upsert: bool,
}

impl FindOperators<'_> {
    /// Inserts a document built from the filter and update when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    /// Collations are not modelled.
    ///
    /// # Errors
    ///
    /// Always fails with [`DocMockError::NotSupported`]; nothing is staged.
    pub fn collation(self, _collation: Document) -> DocMockResult<Self> {
        Err(unsupported("collation"))
    }

    /// Array filters are not modelled.
    ///
    /// # Errors
    ///
    /// Always fails with [`DocMockError::NotSupported`]; nothing is staged.
    pub fn array_filters(self, _filters: Vec<Document>) -> DocMockResult<Self> {
        Err(unsupported("arrayFilters"))
    }

    fn stage(self, model: WriteModel) {
        self.bulk.staged.push(model);
    }

    /// Updates every selected document.
    pub fn update(self, update: Document) {
        let model = WriteModel::UpdateMany { filter: self.filter.clone(), update, upsert: self.upsert };
        self.stage(model);
    }

    /// Updates the first selected document.
    pub fn update_one(self, update: Document) {
        let model = WriteModel::UpdateOne { filter: self.filter.clone(), update, upsert: self.upsert };
        self.stage(model);
    }

    /// Not modelled by the builder.
    ///
    /// # Errors
    ///
    /// Always fails with [`DocMockError::NotSupported`]; nothing is staged.
    pub fn replace_one(self, _replacement: Document) -> DocMockResult<()> {
        Err(unsupported("replaceOne"))
    }

    /// Removes every selected document.
    pub fn remove(self) {
        let model = WriteModel::DeleteMany { filter: self.filter.clone() };
        self.stage(model);
    }

    /// Removes the first selected document.
    pub fn remove_one(self) {
        let model = WriteModel::DeleteOne { filter: self.filter.clone() };
        self.stage(model);
    }
}
