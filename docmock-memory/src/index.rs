//! Per-database index registry.
//!
//! Indexes exist only to enforce uniqueness; lookups always scan. The registry holds
//! every descriptor of one database and answers whether a candidate document would
//! collide with an existing one on any unique index of its namespace.

use bson::{Bson, Document};
use tracing::trace;

use docmock_core::{
    compare::optional_values_equal,
    document::DocumentExt,
    error::{DocMockError, DocMockResult},
    index::{ID_INDEX_NAME, IndexDescriptor, default_index_name},
    options::IndexOptions,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct IndexRegistry {
    indexes: Vec<IndexDescriptor>,
}

impl IndexRegistry {
    pub fn from_descriptors(indexes: Vec<IndexDescriptor>) -> Self {
        Self { indexes }
    }

    pub fn descriptors(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn for_namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a IndexDescriptor> + 'a {
        self.indexes.iter().filter(move |index| index.ns == namespace)
    }

    /// Declares an index and returns its name.
    ///
    /// Declaring an index whose key pattern or name already exists in the namespace
    /// returns the existing name and leaves the registry untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::NotSupported`] for index versions other than 1 and for
    /// `dropDups`, and [`DocMockError::InvalidArgument`] for an empty key pattern.
    pub fn declare(&mut self, namespace: &str, key: Document, options: &IndexOptions) -> DocMockResult<String> {
        check_options(options)?;

        if key.is_empty() {
            return Err(DocMockError::InvalidArgument("index key pattern must not be empty".into()));
        }

        let is_primary = key == bson::doc! { "_id": 1 };
        let name = match &options.name {
            Some(name) => name.clone(),
            None if is_primary => ID_INDEX_NAME.to_string(),
            None => default_index_name(&key),
        };

        if let Some(existing) = self
            .for_namespace(namespace)
            .find(|index| index.key == key || index.name == name)
        {
            return Ok(existing.name.clone());
        }

        trace!(target: "docmock::index", namespace, name = %name, unique = options.unique || is_primary, "Declared index");

        self.indexes.push(IndexDescriptor {
            v: 1,
            key,
            name: name.clone(),
            ns: namespace.to_string(),
            unique: options.unique || is_primary,
        });

        Ok(name)
    }

    /// Registers the implicit `_id` index for a namespace if it is missing.
    pub fn ensure_primary(&mut self, namespace: &str) {
        if !self.for_namespace(namespace).any(IndexDescriptor::is_primary) {
            self.indexes.push(IndexDescriptor::primary(namespace));
        }
    }

    pub fn drop_namespace(&mut self, namespace: &str) {
        self.indexes.retain(|index| index.ns != namespace);
    }

    /// Looks for a unique index on which `candidate` collides with one of `others`.
    ///
    /// The candidate is projected onto each unique index's key fields, a missing field
    /// projecting to "absent" (equal only to another absent field, never to `null`).
    /// The first conflicting index wins; `position` is reported as the offending
    /// position inside the caller's batch.
    pub fn find_conflict<'d>(
        &self,
        namespace: &str,
        candidate: &Document,
        others: impl Iterator<Item = &'d Document> + Clone,
        position: usize,
    ) -> Option<DocMockError> {
        for index in self.for_namespace(namespace).filter(|index| index.unique) {
            let projection = project(index, candidate);

            let collides = others
                .clone()
                .any(|other| {
                    project(index, other)
                        .iter()
                        .zip(projection.iter())
                        .all(|(left, right)| optional_values_equal(*left, *right))
                });

            if collides {
                trace!(target: "docmock::index", namespace, index = %index.name, position, "Duplicate key");
                return Some(DocMockError::DuplicateKey {
                    namespace: namespace.to_string(),
                    index_name: index.name.clone(),
                    index: position,
                });
            }
        }

        None
    }
}

fn project<'d>(index: &IndexDescriptor, document: &'d Document) -> Vec<Option<&'d Bson>> {
    index.fields().map(|field| document.get_path(field)).collect()
}

/// Rejects index options outside the modelled subset.
pub(crate) fn check_options(options: &IndexOptions) -> DocMockResult<()> {
    if let Some(version) = options.version.filter(|version| *version != 1) {
        return Err(DocMockError::NotSupported(format!(
            "index version {version} (only version 1 is supported)"
        )));
    }

    if options.drop_dups {
        return Err(DocMockError::NotSupported("dropDups".into()));
    }

    Ok(())
}
