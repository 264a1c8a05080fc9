//! Typed collection views.
//!
//! A [`TypedCollection`] wraps a [`Collection`] and converts between Serde types and
//! stored documents at the boundary. Filters and updates stay plain documents.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<ObjectId>,
//!     name: String,
//! }
//!
//! let users = client.db("app")?.collection("users")?.with_type::<User>();
//! users.insert_one(&User { id: None, name: "Alice".into() }).await?;
//!
//! let alice: Option<User> = users.find_one(doc! { "name": "Alice" }).await?;
//! ```

use std::{fmt, marker::PhantomData};

use bson::Document;
use serde::{Serialize, de::DeserializeOwned};

use docmock_core::{
    document::{from_document, to_document},
    error::DocMockResult,
    results::{InsertManyResult, InsertOneResult},
};

use crate::{collection::Collection, latency::Pending};

pub struct TypedCollection<T> {
    collection: Collection,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedCollection<T> {
    pub(crate) fn new(collection: Collection) -> Self {
        Self { collection, _marker: PhantomData }
    }

    /// The untyped collection underneath.
    pub fn inner(&self) -> &Collection {
        &self.collection
    }

    /// Converts this view to a different document type.
    pub fn with_type<U>(&self) -> TypedCollection<U> {
        TypedCollection::new(self.collection.clone())
    }
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Serializes and inserts one value.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::Serialization`](docmock_core::error::DocMockError::Serialization)
    /// if `value` does not serialize to a document.
    pub fn insert_one(&self, value: &T) -> Pending<InsertOneResult> {
        match to_document(value) {
            Ok(document) => self.collection.insert_one(document),
            Err(err) => Pending::ready(Err(err)),
        }
    }

    /// Serializes and inserts a batch of values, stopping at the first conflict.
    pub fn insert_many(&self, values: &[T]) -> Pending<InsertManyResult> {
        match values.iter().map(to_document).collect::<DocMockResult<Vec<_>>>() {
            Ok(documents) => self.collection.insert(documents),
            Err(err) => Pending::ready(Err(err)),
        }
    }

    /// Returns the first match converted to `T`.
    pub fn find_one(&self, filter: Document) -> Pending<Option<T>> {
        let pending = self.collection.find_one(filter);
        Pending::new(async move { pending.await?.map(from_document).transpose() })
    }

    /// Returns every match converted to `T`, in stored order.
    pub fn find(&self, filter: Document) -> Pending<Vec<T>> {
        let pending = self.collection.find(filter).to_array();
        Pending::new(async move { pending.await?.into_iter().map(from_document).collect() })
    }
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self::new(self.collection.clone())
    }
}

impl<T> fmt::Debug for TypedCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCollection")
            .field("namespace", &self.collection.namespace())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
