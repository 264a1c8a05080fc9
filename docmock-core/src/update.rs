//! The update synthesizer seam.
//!
//! An update specification is either a replacement document (no `$`-prefixed keys) or
//! a sparse set of operators (`$set`, `$inc`, `$push`, ...). A [`UpdateSynthesizer`]
//! derives the next state of a document from its current state and a specification.

use bson::Document;

use crate::{document::is_operator, error::DocMockResult};

/// Which branch of a write is applying the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// The update applies to an existing, matched document. `$setOnInsert` is ignored.
    Matched,
    /// The update builds the document an upsert inserts. `$setOnInsert` applies.
    Insert,
}

/// Derives a new document from a current one and an update specification.
pub trait UpdateSynthesizer: Send + Sync + std::fmt::Debug {
    /// Returns the next state of `document` under `update`. `document` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidState`](crate::error::DocMockError::InvalidState) for
    /// malformed operator combinations and
    /// [`DocMockError::NotSupported`](crate::error::DocMockError::NotSupported) for
    /// operators outside the supported subset.
    fn apply(&self, document: &Document, update: &Document, mode: UpdateMode) -> DocMockResult<Document>;
}

/// Returns `true` if the specification is made of update operators rather than a
/// replacement document. An empty specification counts as a replacement.
pub fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| is_operator(key))
}

/// Returns the field paths an update's `$unset` names.
pub fn unset_paths(update: &Document) -> Vec<String> {
    update
        .get_document("$unset")
        .map(|fields| fields.keys().cloned().collect())
        .unwrap_or_default()
}
