//! An in-memory stand-in for a MongoDB driver.
//!
//! This crate is the primary entry point of docmock. It re-exports the core types and
//! the in-memory engine so test suites depend on one crate.
//!
//! # Features
//!
//! - **Driver-shaped API** - Clients, databases, collections, cursors and bulk builders
//! - **Unique indexes** - Duplicate keys are rejected with the server's error code
//! - **Query and update operators** - The common subset, with explicit errors for the rest
//! - **Pluggable collaborators** - Swap the evaluator, update synthesizer, id factory or persistence hook
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock::prelude::*;
//! use bson::doc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> DocMockResult<()> {
//!     let client = MockClient::builder().max_delay(Duration::ZERO).build().await?;
//!     let users = client.db("app")?.collection("users")?;
//!
//!     users.insert_many(vec![doc! { "name": "Alice", "age": 31 }, doc! { "name": "Bob", "age": 27 }]).await?;
//!
//!     let mut cursor = users.find(doc! { "age": { "$gt": 25 } });
//!     cursor.sort(doc! { "age": 1 })?.project(doc! { "_id": 0, "name": 1 })?;
//!
//!     let names = cursor.to_array().await?;
//!     assert_eq!(names, vec![doc! { "name": "Bob" }, doc! { "name": "Alice" }]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Callbacks
//!
//! Every operation returns a [`Pending`](memory::Pending) value. Besides awaiting it,
//! callers can pass a completion callback, which runs on the tokio runtime:
//!
//! ```ignore
//! users.find_one(doc! { "name": "Alice" }).on_complete(|result| match result {
//!     Ok(Some(user)) => println!("found {user}"),
//!     Ok(None) => println!("no such user"),
//!     Err(err) => eprintln!("lookup failed: {err}"),
//! });
//! ```
//!
//! # Bulk Writes
//!
//! ```ignore
//! let mut bulk = users.initialize_ordered_bulk_op();
//! bulk.insert(doc! { "name": "Carol" });
//! bulk.find(doc! { "name": "Alice" }).update_one(doc! { "$inc": { "age": 1 } });
//! bulk.find(doc! { "name": "Bob" }).remove_one();
//!
//! let result = bulk.execute().await?;
//! assert_eq!(result.inserted_count, 1);
//! ```

pub mod prelude;

pub use docmock_core::{compare, document, error, id, index, options, persist, query, results, update};

// Re-export BSON types for convenience
pub use bson;

/// The in-memory engine.
pub mod memory {
    pub use docmock_memory::{
        BulkOperation, Collection, Cursor, CursorState, DEFAULT_MAX_DELAY, Database, FindOperators, MatchEvaluator,
        MockClient, MockClientBuilder, MockConfig, OperatorUpdater, Pending, TypedCollection,
    };
}
