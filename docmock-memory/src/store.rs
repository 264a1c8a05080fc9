//! The document store of a single collection.
//!
//! A [`DocumentStore`] owns the ordered documents of one namespace. It distinguishes
//! a collection that was never written to from one that is empty: the document list
//! only exists once the collection is materialized, and materializing it registers
//! the implicit `_id` index.
//!
//! Every primitive here runs synchronously under the database write lock, so a
//! uniqueness check and the mutation it guards are never interleaved with another
//! operation.

use std::collections::HashMap;

use bson::{Bson, Document};
use tracing::trace;

use docmock_core::{
    document::{DocumentExt, ID_FIELD},
    error::{DocMockError, DocMockResult},
    id::IdFactory,
    query::PredicateEvaluator,
};

use crate::index::IndexRegistry;

/// Outcome of a batch insert: the documents committed before the first conflict,
/// and the conflict itself if there was one.
#[derive(Debug)]
pub(crate) struct InsertOutcome {
    pub inserted: Vec<Document>,
    pub error: Option<DocMockError>,
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentStore {
    namespace: String,
    documents: Option<Vec<Document>>,
}

impl DocumentStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), documents: None }
    }

    pub fn restore(namespace: impl Into<String>, documents: Vec<Document>) -> Self {
        Self { namespace: namespace.into(), documents: Some(documents) }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_materialized(&self) -> bool {
        self.documents.is_some()
    }

    /// The stored documents. Empty for a collection that was never materialized.
    pub fn documents(&self) -> &[Document] {
        self.documents.as_deref().unwrap_or_default()
    }

    /// Creates the document list, registering the `_id` index when `with_id_index` is set.
    /// Returns `true` if the collection was not materialized before.
    pub fn materialize(&mut self, indexes: &mut IndexRegistry, with_id_index: bool) -> bool {
        if self.documents.is_some() {
            return false;
        }

        if with_id_index {
            indexes.ensure_primary(&self.namespace);
        }

        trace!(target: "docmock::store", namespace = %self.namespace, "Materialized collection");
        self.documents = Some(Vec::new());
        true
    }

    fn documents_mut(&mut self, indexes: &mut IndexRegistry) -> &mut Vec<Document> {
        self.materialize(indexes, true);
        self.documents.get_or_insert_with(Vec::new)
    }

    /// Inserts documents in order, assigning missing identifiers, and stops at the
    /// first one that violates a unique index. Documents before it stay committed.
    pub fn insert_many(
        &mut self,
        documents: Vec<Document>,
        indexes: &mut IndexRegistry,
        ids: &dyn IdFactory,
    ) -> InsertOutcome {
        let namespace = self.namespace.clone();
        let stored = self.documents_mut(indexes);
        let mut inserted = Vec::with_capacity(documents.len());

        for (position, document) in documents.into_iter().enumerate() {
            let document = with_id(document, ids);

            if let Some(conflict) = indexes.find_conflict(&namespace, &document, stored.iter(), position) {
                return InsertOutcome { inserted, error: Some(conflict) };
            }

            trace!(target: "docmock::store", namespace = %namespace, id = ?document.id(), "Inserted document");
            stored.push(document.clone());
            inserted.push(document);
        }

        InsertOutcome { inserted, error: None }
    }

    /// Returns the positions of the documents matching `query`, in stored order.
    pub fn find_matching(&self, query: &Document, evaluator: &dyn PredicateEvaluator) -> DocMockResult<Vec<usize>> {
        evaluator.filter(query, self.documents())
    }

    /// Replaces the documents at `positions` with `candidates`.
    ///
    /// Every candidate is checked against the store as it would look with the earlier
    /// candidates already applied and its own original left out. Nothing is written
    /// unless all candidates pass.
    pub fn mutate_in_place(
        &mut self,
        positions: &[usize],
        candidates: Vec<Document>,
        indexes: &IndexRegistry,
    ) -> DocMockResult<()> {
        {
            let documents = self.documents.as_deref().unwrap_or_default();
            let mut staged: HashMap<usize, &Document> = HashMap::with_capacity(positions.len());

            for (batch_position, (position, candidate)) in positions.iter().zip(candidates.iter()).enumerate() {
                let others = documents
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| other != position)
                    .map(|(other, document)| staged.get(&other).copied().unwrap_or(document));

                if let Some(conflict) = indexes.find_conflict(&self.namespace, candidate, others, batch_position) {
                    return Err(conflict);
                }

                staged.insert(*position, candidate);
            }
        }

        if let Some(stored) = self.documents.as_mut() {
            for (position, candidate) in positions.iter().zip(candidates) {
                if let Some(slot) = stored.get_mut(*position) {
                    *slot = candidate;
                }
            }
        }

        Ok(())
    }

    /// Removes the first match, or every match, and returns the removed documents in
    /// stored order.
    pub fn delete_matching(
        &mut self,
        query: &Document,
        single: bool,
        evaluator: &dyn PredicateEvaluator,
    ) -> DocMockResult<Vec<Document>> {
        let mut positions = self.find_matching(query, evaluator)?;
        if single {
            positions.truncate(1);
        }

        let Some(stored) = self.documents.as_mut() else {
            return Ok(Vec::new());
        };

        let mut removed = positions
            .iter()
            .rev()
            .map(|position| stored.remove(*position))
            .collect::<Vec<_>>();
        removed.reverse();

        trace!(
            target: "docmock::store",
            namespace = %self.namespace,
            ids = ?removed.iter().filter_map(DocumentExt::id).collect::<Vec<_>>(),
            "Removed documents"
        );

        Ok(removed)
    }
}

/// Puts `_id` first, generating one if the document has none.
pub(crate) fn with_id(mut document: Document, ids: &dyn IdFactory) -> Document {
    let id = match document.remove(ID_FIELD) {
        Some(Bson::Null) | None => ids.next_id(),
        Some(id) => id,
    };

    let mut ordered = Document::new();
    ordered.insert(ID_FIELD, id);
    ordered.extend(document);
    ordered
}
