//! The persistence hook and the snapshot layout it receives.
//!
//! After every mutation the engine hands a [`DatabaseSnapshot`] of the affected
//! database to the configured [`Persistence`] implementation. The call is
//! fire-and-forget: snapshots are queued in mutation order and handed to the hook
//! by a background task, the write that triggered one does not wait for it, and a
//! failing hook is logged rather than reported to the writer.
//!
//! The snapshot mirrors the in-memory layout one to one: one list of documents per
//! collection and one list of index descriptors per database.
//!
//! # Examples
//!
//! ```ignore
//! use docmock::persist::{MemoryPersistence, Persistence};
//!
//! let persistence = Arc::new(MemoryPersistence::default());
//! let client = MockClient::builder().persistence(persistence.clone()).build().await?;
//!
//! client.db("app")?.collection("users")?.insert_one(doc! { "name": "Alice" }).await?;
//! client.flush().await;
//! let saved = persistence.latest("app");
//! ```

use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use bson::Document;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{error::DocMockResult, index::IndexDescriptor};

/// The documents of one materialized collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CollectionSnapshot {
    pub name: String,
    pub documents: Vec<Document>,
}

/// The full state of one database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DatabaseSnapshot {
    pub name: String,
    pub collections: Vec<CollectionSnapshot>,
    pub indexes: Vec<IndexDescriptor>,
}

impl DatabaseSnapshot {
    /// Returns the documents of the named collection, if it was materialized.
    pub fn collection(&self, name: &str) -> Option<&[Document]> {
        self.collections
            .iter()
            .find(|collection| collection.name == name)
            .map(|collection| collection.documents.as_slice())
    }
}

/// Receives database snapshots after mutations.
#[async_trait]
pub trait Persistence: Send + Sync + Debug {
    /// Stores `snapshot`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the engine and otherwise ignored.
    async fn persist(&self, snapshot: DatabaseSnapshot) -> DocMockResult<()>;
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl Persistence for NoopPersistence {
    async fn persist(&self, _snapshot: DatabaseSnapshot) -> DocMockResult<()> {
        Ok(())
    }
}

/// Keeps the most recent snapshot of every database in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshots: Mutex<HashMap<String, DatabaseSnapshot>>,
}

impl MemoryPersistence {
    /// Returns the last snapshot persisted for `database`.
    pub fn latest(&self, database: &str) -> Option<DatabaseSnapshot> {
        self.snapshots.lock().get(database).cloned()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn persist(&self, snapshot: DatabaseSnapshot) -> DocMockResult<()> {
        self.snapshots.lock().insert(snapshot.name.clone(), snapshot);
        Ok(())
    }
}
