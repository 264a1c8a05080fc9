//! Convenient re-exports of commonly used types from docmock.
//!
//! ```ignore
//! use docmock::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client, database, collection and cursor handles
//! - Option and result structs for every operation
//! - The collaborator traits and their default implementations
//! - Error types

pub use docmock_core::{
    document::{DocumentExt, from_document, to_document},
    error::{DocMockError, DocMockResult},
    id::{IdFactory, ObjectIdFactory, UuidFactory},
    index::IndexDescriptor,
    options::{
        CreateCollectionOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, RemoveOptions, ReturnDocument,
        UpdateOptions, WriteModel,
    },
    persist::{DatabaseSnapshot, MemoryPersistence, NoopPersistence, Persistence},
    query::{PredicateEvaluator, Sort, SortDirection},
    results::{
        BulkWriteResult, DeleteResult, FindAndModifyResult, InsertManyResult, InsertOneResult, LastErrorObject,
        UpdateResult,
    },
    update::{UpdateMode, UpdateSynthesizer},
};
pub use docmock_memory::{
    BulkOperation, Collection, Cursor, CursorState, Database, MatchEvaluator, MockClient, MockClientBuilder, MockConfig,
    OperatorUpdater, Pending, TypedCollection,
};
