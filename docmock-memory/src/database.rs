//! Databases and their state.
//!
//! All collections of a database live behind one async read-write lock, together
//! with the database's index registry. Operations take the lock only after their
//! simulated latency, and hold it for one synchronous step.

use std::{collections::BTreeMap, sync::Arc};

use bson::{Document, doc};
use tracing::debug;

use docmock_core::{
    error::{DocMockError, DocMockResult},
    index::IndexDescriptor,
    options::{CreateCollectionOptions, IndexOptions},
    persist::{CollectionSnapshot, DatabaseSnapshot},
};

use crate::{
    client::{Engine, SharedState},
    collection::Collection,
    index::{IndexRegistry, check_options},
    latency::Pending,
    store::DocumentStore,
};

/// The collection that accepts index descriptors as inserts.
pub(crate) const SYSTEM_INDEXES: &str = "system.indexes";

#[derive(Debug)]
pub(crate) struct DatabaseState {
    name: String,
    stores: BTreeMap<String, DocumentStore>,
    indexes: IndexRegistry,
    dirty: bool,
}

impl DatabaseState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stores: BTreeMap::new(),
            indexes: IndexRegistry::default(),
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self, collection: &str) -> String {
        format!("{}.{collection}", self.name)
    }

    pub fn store(&self, collection: &str) -> Option<&DocumentStore> {
        self.stores.get(collection)
    }

    pub fn is_materialized(&self, collection: &str) -> bool {
        self.store(collection).is_some_and(DocumentStore::is_materialized)
    }

    /// The documents of a collection, empty if it was never materialized.
    pub fn documents(&self, collection: &str) -> &[Document] {
        self.store(collection).map(DocumentStore::documents).unwrap_or_default()
    }

    /// The store of a collection, created lazily, together with the index registry.
    pub fn store_mut(&mut self, collection: &str) -> (&mut DocumentStore, &mut IndexRegistry) {
        let namespace = self.namespace(collection);
        let store = self
            .stores
            .entry(collection.to_string())
            .or_insert_with(|| DocumentStore::new(namespace));

        (store, &mut self.indexes)
    }

    pub fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Materializes a collection. Returns `false` if it already was.
    pub fn materialize(&mut self, collection: &str, with_id_index: bool) -> bool {
        let (store, indexes) = self.store_mut(collection);
        let created = store.materialize(indexes, with_id_index);
        if created {
            self.mark_dirty();
        }
        created
    }

    pub fn create_index(&mut self, collection: &str, key: Document, options: &IndexOptions) -> DocMockResult<String> {
        check_options(options)?;
        self.materialize(collection, true);

        let namespace = self.namespace(collection);
        let name = self.indexes.declare(&namespace, key, options)?;
        self.mark_dirty();

        Ok(name)
    }

    pub fn drop_collection(&mut self, collection: &str) -> DocMockResult<()> {
        if !self.is_materialized(collection) {
            return Err(DocMockError::CollectionNotFound("ns not found".into()));
        }

        let namespace = self.namespace(collection);
        self.stores.remove(collection);
        self.indexes.drop_namespace(&namespace);
        self.mark_dirty();

        Ok(())
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.stores
            .iter()
            .filter(|(_, store)| store.is_materialized())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> DatabaseSnapshot {
        DatabaseSnapshot {
            name: self.name.clone(),
            collections: self
                .stores
                .iter()
                .filter(|(_, store)| store.is_materialized())
                .map(|(name, store)| CollectionSnapshot {
                    name: name.clone(),
                    documents: store.documents().to_vec(),
                })
                .collect(),
            indexes: self.indexes.descriptors().to_vec(),
        }
    }

    /// Replaces every collection and index with the contents of `snapshot`.
    pub fn restore(&mut self, snapshot: DatabaseSnapshot) {
        self.stores = snapshot
            .collections
            .into_iter()
            .map(|collection| {
                let store = DocumentStore::restore(self.namespace(&collection.name), collection.documents);
                (collection.name, store)
            })
            .collect();
        self.indexes = IndexRegistry::from_descriptors(snapshot.indexes);
        self.mark_dirty();
    }
}

/// A handle to one database of a [`MockClient`](crate::MockClient).
///
/// Handles are cheap to clone and all clones share the same state.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    engine: Arc<Engine>,
    state: SharedState,
}

impl Database {
    pub(crate) fn new(name: &str, engine: Arc<Engine>, state: SharedState) -> Self {
        Self { name: name.to_string(), engine, state }
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a handle to the named collection. Nothing is created until the first
    /// write.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidArgument`] for empty names and names containing
    /// `$` or a null character.
    pub fn collection(&self, name: &str) -> DocMockResult<Collection> {
        validate_collection_name(name)?;
        Ok(Collection::new(&self.name, name, Arc::clone(&self.engine), Arc::clone(&self.state)))
    }

    /// Returns a handle to a collection that must already exist.
    pub fn collection_strict(&self, name: &str) -> Pending<Collection> {
        let collection = match self.collection(name) {
            Ok(collection) => collection,
            Err(err) => return Pending::ready(Err(err)),
        };

        let name = name.to_string();
        self.engine.read(&self.state, move |state, _| {
            if state.is_materialized(&name) {
                Ok(collection)
            } else {
                Err(DocMockError::CollectionNotFound(format!(
                    "Collection {name} does not exist. Currently in strict mode."
                )))
            }
        })
    }

    /// Materializes a collection and returns a handle to it.
    ///
    /// # Errors
    ///
    /// With `strict` set, fails with [`DocMockError::CollectionExists`] if the
    /// collection was already materialized.
    pub fn create_collection(&self, name: &str, options: CreateCollectionOptions) -> Pending<Collection> {
        let collection = match self.collection(name) {
            Ok(collection) => collection,
            Err(err) => return Pending::ready(Err(err)),
        };

        debug!(target: "docmock::database", database = %self.name, collection = %name, "Create collection");

        let name = name.to_string();
        self.engine.write(&self.state, move |state, _| {
            if !state.materialize(&name, options.auto_index_id) && options.strict {
                return Err(DocMockError::CollectionExists(name));
            }
            Ok(collection)
        })
    }

    /// Drops a collection with its indexes.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::CollectionNotFound`] (`ns not found`) if the collection
    /// was never materialized.
    pub fn drop_collection(&self, name: &str) -> Pending<()> {
        debug!(target: "docmock::database", database = %self.name, collection = %name, "Drop collection");

        let name = name.to_string();
        self.engine.write(&self.state, move |state, _| state.drop_collection(&name))
    }

    /// Lists materialized collections as `{ name, type }` documents.
    pub fn list_collections(&self) -> Pending<Vec<Document>> {
        self.collection_names().map(|names| {
            names
                .into_iter()
                .map(|name| doc! { "name": name, "type": "collection" })
                .collect()
        })
    }

    pub fn collection_names(&self) -> Pending<Vec<String>> {
        self.engine.read(&self.state, |state, _| Ok(state.collection_names()))
    }

    /// Declares an index on a collection, materializing it if needed. Returns the
    /// index name.
    pub fn create_index(&self, collection: &str, key: Document, options: IndexOptions) -> Pending<String> {
        match self.collection(collection) {
            Ok(collection) => collection.create_index(key, options),
            Err(err) => Pending::ready(Err(err)),
        }
    }

    /// Returns the index descriptors of a collection.
    pub fn index_information(&self, collection: &str) -> Pending<Vec<IndexDescriptor>> {
        match self.collection(collection) {
            Ok(collection) => collection.index_information(),
            Err(err) => Pending::ready(Err(err)),
        }
    }

    /// Captures the database in the persisted layout.
    pub fn snapshot(&self) -> Pending<DatabaseSnapshot> {
        self.engine.read(&self.state, |state, _| Ok(state.snapshot()))
    }

    /// Replaces the database contents with a captured snapshot. The snapshot's own
    /// name is ignored.
    pub fn restore(&self, mut snapshot: DatabaseSnapshot) -> Pending<()> {
        snapshot.name = self.name.clone();
        self.engine.write(&self.state, move |state, _| {
            state.restore(snapshot);
            Ok(())
        })
    }
}

fn validate_collection_name(name: &str) -> DocMockResult<()> {
    if name.is_empty() || name.contains(['$', '\0']) || name.starts_with('.') || name.ends_with('.') {
        return Err(DocMockError::InvalidArgument(format!("invalid collection name '{name}'")));
    }
    Ok(())
}
