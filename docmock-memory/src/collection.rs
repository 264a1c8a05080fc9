//! Collection handles.
//!
//! A [`Collection`] is a cheap, cloneable handle onto one namespace of a database. It
//! does not own documents; every call is scheduled through the client engine, waits
//! the simulated latency, and then runs against the shared database state.
//!
//! # Example
//!
//! ```ignore
//! let users = client.db("app")?.collection("users")?;
//! users.create_index(doc! { "email": 1 }, IndexOptions::unique()).await?;
//!
//! users.insert_one(doc! { "email": "alice@example.com" }).await?;
//! users
//!     .update_one(doc! { "email": "alice@example.com" }, doc! { "$set": { "active": true } }, UpdateOptions::default())
//!     .await?;
//!
//! let active = users.find(doc! { "active": true }).to_array().await?;
//! ```

use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::debug;

use docmock_core::{
    document::{DocumentExt, ID_FIELD},
    error::{DocMockError, DocMockResult},
    index::IndexDescriptor,
    options::{
        FindOneAndUpdateOptions, FindOptions, IndexOptions, RemoveOptions, UpdateOptions, WriteModel,
    },
    query::parse_sort,
    results::{
        BulkWriteResult, DeleteResult, FindAndModifyResult, InsertManyResult, InsertOneResult, UpdateResult,
        WriteOutcome,
    },
    update::is_operator_update,
};

use crate::{
    bulk::BulkOperation,
    client::{Engine, SharedState},
    cursor::{Cursor, Pipeline, Projection},
    database::DatabaseState,
    index::check_options,
    latency::Pending,
    store::with_id,
    typed::TypedCollection,
    write,
};

/// A handle to one collection.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    namespace: String,
    engine: Arc<Engine>,
    state: SharedState,
}

impl Collection {
    pub(crate) fn new(database: &str, name: &str, engine: Arc<Engine>, state: SharedState) -> Self {
        Self {
            name: name.to_string(),
            namespace: format!("{database}.{name}"),
            engine,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `database.collection` pair.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns a view of this collection that converts documents to and from `T`.
    pub fn with_type<T>(&self) -> TypedCollection<T> {
        TypedCollection::new(self.clone())
    }

    fn schedule_write<T, F>(&self, operation: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DatabaseState, &Engine, &str) -> DocMockResult<T> + Send + 'static,
    {
        let name = self.name.clone();
        self.engine.write(&self.state, move |state, engine| operation(state, engine, &name))
    }

    /// Inserts a batch of documents.
    ///
    /// Documents without `_id` get a generated one. The batch stops at the first
    /// unique-index conflict; documents before it stay committed.
    pub fn insert(&self, documents: Vec<Document>) -> Pending<InsertManyResult> {
        debug!(target: "docmock::collection", namespace = %self.namespace, count = documents.len(), "Insert");
        self.schedule_write(move |state, engine, name| write::insert(state, engine, name, documents))
    }

    pub fn insert_many(&self, documents: Vec<Document>) -> Pending<InsertManyResult> {
        self.insert(documents)
    }

    pub fn insert_one(&self, document: Document) -> Pending<InsertOneResult> {
        self.insert(vec![document]).map(|result| InsertOneResult {
            inserted_id: result.inserted_ids.get(&0).cloned().unwrap_or(Bson::Null),
            ops: result.ops,
            result: result.result,
        })
    }

    /// The legacy update entry point: first match, or every match with `multi`,
    /// optionally upserting.
    pub fn update(&self, filter: Document, update: Document, options: UpdateOptions) -> Pending<UpdateResult> {
        debug!(
            target: "docmock::collection",
            namespace = %self.namespace,
            multi = options.multi,
            upsert = options.upsert,
            "Update"
        );
        self.schedule_write(move |state, engine, name| write::update(state, engine, name, &filter, &update, options))
    }

    pub fn update_one(&self, filter: Document, update: Document, options: UpdateOptions) -> Pending<UpdateResult> {
        self.update(filter, update, UpdateOptions { multi: false, ..options })
    }

    pub fn update_many(&self, filter: Document, update: Document, options: UpdateOptions) -> Pending<UpdateResult> {
        self.update(filter, update, UpdateOptions { multi: true, ..options })
    }

    /// Replaces the first match with `replacement`, keeping its `_id`.
    pub fn replace_one(&self, filter: Document, replacement: Document, options: UpdateOptions) -> Pending<UpdateResult> {
        if is_operator_update(&replacement) {
            return Pending::ready(Err(DocMockError::InvalidArgument(
                "replacement document must not contain update operators".into(),
            )));
        }
        self.update_one(filter, replacement, options)
    }

    pub fn delete_one(&self, filter: Document) -> Pending<DeleteResult> {
        self.remove(filter, RemoveOptions { single: true })
    }

    pub fn delete_many(&self, filter: Document) -> Pending<DeleteResult> {
        self.remove(filter, RemoveOptions::default())
    }

    /// Removes every match, or only the first with `single`.
    pub fn remove(&self, filter: Document, options: RemoveOptions) -> Pending<DeleteResult> {
        debug!(target: "docmock::collection", namespace = %self.namespace, single = options.single, "Remove");
        self.schedule_write(move |state, engine, name| write::delete(state, engine, name, &filter, options.single))
    }

    /// Updates the first match and returns the pre- or post-image in a
    /// find-and-modify envelope.
    pub fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> Pending<FindAndModifyResult> {
        debug!(target: "docmock::collection", namespace = %self.namespace, upsert = options.upsert, "Find one and update");
        self.schedule_write(move |state, engine, name| {
            write::find_one_and_update(state, engine, name, &filter, &update, &options)
        })
    }

    /// Replaces the document with the same `_id`, or inserts it. A document without
    /// `_id` is assigned one first.
    pub fn save(&self, document: Document) -> Pending<UpdateResult> {
        let document = with_id(document, self.engine.ids.as_ref());
        let filter = doc! { ID_FIELD: document.id().cloned().unwrap_or(Bson::Null) };
        self.update(filter, document, UpdateOptions::upsert())
    }

    /// Runs a batch of write models concurrently.
    ///
    /// Every model is scheduled independently; the first failure in model order fails
    /// the call, and models that already committed stay committed.
    pub fn bulk_write(&self, models: Vec<WriteModel>) -> Pending<BulkWriteResult> {
        debug!(target: "docmock::collection", namespace = %self.namespace, count = models.len(), "Bulk write");
        BulkOperation::from_models(self.clone(), false, models).execute()
    }

    /// Starts a builder whose operations run one after the other and stop at the
    /// first failure.
    pub fn initialize_ordered_bulk_op(&self) -> BulkOperation {
        BulkOperation::new(self.clone(), true)
    }

    /// Starts a builder whose operations run concurrently.
    pub fn initialize_unordered_bulk_op(&self) -> BulkOperation {
        BulkOperation::new(self.clone(), false)
    }

    pub(crate) fn write_model(&self, model: WriteModel) -> Pending<WriteOutcome> {
        match model {
            WriteModel::InsertOne { document } => self.insert(vec![document]).map(WriteOutcome::Inserted),
            WriteModel::UpdateOne { filter, update, upsert } => {
                self.update_one(filter, update, UpdateOptions { upsert, multi: false }).map(WriteOutcome::Updated)
            }
            WriteModel::UpdateMany { filter, update, upsert } => {
                self.update_many(filter, update, UpdateOptions { upsert, multi: true }).map(WriteOutcome::Updated)
            }
            WriteModel::ReplaceOne { filter, replacement, upsert } => self
                .replace_one(filter, replacement, UpdateOptions { upsert, multi: false })
                .map(WriteOutcome::Updated),
            WriteModel::DeleteOne { filter } => self.delete_one(filter).map(WriteOutcome::Deleted),
            WriteModel::DeleteMany { filter } => self.delete_many(filter).map(WriteOutcome::Deleted),
        }
    }

    /// Returns an unconfigured cursor over the documents matching `filter`.
    pub fn find(&self, filter: Document) -> Cursor {
        debug!(target: "docmock::collection", namespace = %self.namespace, "Find");
        Cursor::new(self.clone(), filter)
    }

    /// Returns a cursor preconfigured from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidArgument`] for a malformed sort or projection.
    pub fn find_with(&self, filter: Document, options: FindOptions) -> DocMockResult<Cursor> {
        let mut cursor = self.find(filter);

        if let Some(sort) = options.sort {
            cursor.sort(sort)?;
        }
        if let Some(projection) = options.projection {
            cursor.project(projection)?;
        }
        if let Some(skip) = options.skip {
            cursor.skip(skip)?;
        }
        if let Some(limit) = options.limit {
            cursor.limit(limit)?;
        }

        Ok(cursor)
    }

    /// Returns a copy of the first matching document.
    pub fn find_one(&self, filter: Document) -> Pending<Option<Document>> {
        self.find_one_with(filter, FindOptions::default())
    }

    /// Returns a copy of the first matching document, honoring the sort, skip and
    /// projection of `options`.
    pub fn find_one_with(&self, filter: Document, options: FindOptions) -> Pending<Option<Document>> {
        debug!(target: "docmock::collection", namespace = %self.namespace, "Find one");

        let pipeline = match one_pipeline(filter, options) {
            Ok(pipeline) => pipeline,
            Err(err) => return Pending::ready(Err(err)),
        };

        self.select(pipeline).map(|documents| documents.into_iter().next())
    }

    /// Counts the documents matching `filter`.
    pub fn count(&self, filter: Document) -> Pending<u64> {
        self.count_pipeline(Pipeline::new(filter), false)
    }

    pub fn count_documents(&self, filter: Document) -> Pending<u64> {
        self.count(filter)
    }

    /// Counts every stored document without evaluating a filter.
    pub fn estimated_document_count(&self) -> Pending<u64> {
        let name = self.name.clone();
        self.engine.read(&self.state, move |state, _| Ok(state.documents(&name).len() as u64))
    }

    /// Declares an index and returns its name. Declaring an existing key pattern or
    /// name again returns the existing name.
    ///
    /// # Errors
    ///
    /// Unsupported options (`version` other than 1, `drop_dups`) fail with
    /// [`DocMockError::NotSupported`] before the call is scheduled.
    pub fn create_index(&self, key: Document, options: IndexOptions) -> Pending<String> {
        if let Err(err) = check_options(&options) {
            return Pending::ready(Err(err));
        }

        debug!(target: "docmock::collection", namespace = %self.namespace, key = %key, "Create index");
        self.schedule_write(move |state, _, name| state.create_index(name, key, &options))
    }

    /// Returns the index descriptors declared on this collection.
    pub fn index_information(&self) -> Pending<Vec<IndexDescriptor>> {
        let namespace = self.namespace.clone();
        self.engine.read(&self.state, move |state, _| {
            Ok(state.indexes().for_namespace(&namespace).cloned().collect())
        })
    }

    /// Drops the collection with its indexes.
    pub fn drop(&self) -> Pending<()> {
        debug!(target: "docmock::collection", namespace = %self.namespace, "Drop");
        self.schedule_write(|state, _, name| state.drop_collection(name))
    }

    pub(crate) async fn pause(&self) {
        self.engine.latency.pause().await;
    }

    pub(crate) fn select(&self, pipeline: Pipeline) -> Pending<Vec<Document>> {
        let name = self.name.clone();
        self.engine.read(&self.state, move |state, engine| {
            pipeline.run(state.documents(&name), engine.evaluator.as_ref())
        })
    }

    pub(crate) fn select_nothing(&self) -> Pending<Vec<Document>> {
        let latency = self.engine.latency;
        Pending::new(async move {
            latency.pause().await;
            Ok(Vec::new())
        })
    }

    pub(crate) fn count_pipeline(&self, pipeline: Pipeline, apply_skip_limit: bool) -> Pending<u64> {
        let name = self.name.clone();
        self.engine.read(&self.state, move |state, engine| {
            pipeline.count(state.documents(&name), engine.evaluator.as_ref(), apply_skip_limit)
        })
    }
}

fn one_pipeline(filter: Document, options: FindOptions) -> DocMockResult<Pipeline> {
    let mut pipeline = Pipeline::new(filter);

    if let Some(sort) = &options.sort {
        pipeline.sort = parse_sort(sort)?;
    }
    if let Some(projection) = &options.projection {
        pipeline.projection = Projection::parse(projection)?;
    }
    pipeline.skip = options.skip.unwrap_or(0);
    pipeline.limit = 1;

    Ok(pipeline)
}
