//! Query predicates and sort specifications.
//!
//! Queries are MongoDB filter documents (`{ "age": { "$gt": 18 } }`). The engine treats
//! them as opaque and hands them to a [`PredicateEvaluator`]; the only structure it
//! reads itself is the sort specification and the literal fields used to seed upserts.

use bson::{Bson, Document};

use crate::error::{DocMockError, DocMockResult};

/// Evaluates filter documents against stored documents.
///
/// Implementations must be pure: the same query and document always produce the
/// same answer, and neither argument is modified.
pub trait PredicateEvaluator: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `document` satisfies `query`.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::NotSupported`] for operators outside the supported subset.
    fn matches(&self, query: &Document, document: &Document) -> DocMockResult<bool>;

    /// Returns the positions of the documents that satisfy `query`, in their original order.
    fn filter(&self, query: &Document, documents: &[Document]) -> DocMockResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in documents.iter().enumerate() {
            if self.matches(query, document)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (type rank first, then natural order within a type).
    Asc,
    /// Descending order.
    Desc,
}

/// Sort specification for query results.
///
/// Specifies which field to sort by and in which direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Parses a sort document such as `{ "a": 1, "b": -1 }` into sort keys, in order.
///
/// # Errors
///
/// Returns [`DocMockError::InvalidArgument`] if a direction is not `1` or `-1`.
pub fn parse_sort(spec: &Document) -> DocMockResult<Vec<Sort>> {
    spec.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::Int32(1) | Bson::Int64(1) => SortDirection::Asc,
                Bson::Int32(-1) | Bson::Int64(-1) => SortDirection::Desc,
                Bson::Double(value) if *value == 1.0 => SortDirection::Asc,
                Bson::Double(value) if *value == -1.0 => SortDirection::Desc,
                other => {
                    return Err(DocMockError::InvalidArgument(format!(
                        "invalid sort direction {other} for field '{field}'"
                    )));
                }
            };

            Ok(Sort { field: field.clone(), direction })
        })
        .collect()
}
