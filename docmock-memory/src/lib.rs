//! In-memory engine for docmock.
//!
//! This crate implements a MongoDB-driver-shaped client whose databases live entirely
//! in process memory. It is meant for test suites that want driver semantics
//! (unique indexes, upserts, cursors, bulk writes) without a server.
//!
//! # Features
//!
//! - **Driver-shaped surface** - `insert_one`, `update_many`, `find_one_and_update`, `bulk_write` and friends
//! - **Unique indexes** - Enforced on every insert and update, checked before anything is committed
//! - **Cursors** - Sort, skip, limit, map and projection in a fixed pipeline order
//! - **Bulk builders** - Ordered (fail-stop) and unordered (concurrent) batches
//! - **Simulated latency** - Every operation completes after a random delay
//! - **Dual completion** - Await any operation, or hand it a callback
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock_memory::MockClient;
//! use docmock_core::options::IndexOptions;
//! use bson::doc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MockClient::builder().max_delay(Duration::from_millis(5)).build().await?;
//!     let users = client.db("app")?.collection("users")?;
//!
//!     users.create_index(doc! { "email": 1 }, IndexOptions::unique()).await?;
//!     users.insert_one(doc! { "email": "alice@example.com" }).await?;
//!
//!     let err = users.insert_one(doc! { "email": "alice@example.com" }).await.unwrap_err();
//!     assert!(err.is_duplicate_key());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_memory;

pub mod bulk;
pub mod client;
pub mod collection;
pub mod cursor;
pub mod database;
pub mod evaluator;
mod index;
pub mod latency;
mod persister;
mod store;
pub mod typed;
pub mod updater;
mod upsert;
mod write;

pub use bulk::{BulkOperation, FindOperators};
pub use client::{MockClient, MockClientBuilder, MockConfig};
pub use collection::Collection;
pub use cursor::{Cursor, CursorState};
pub use database::Database;
pub use evaluator::MatchEvaluator;
pub use latency::{DEFAULT_MAX_DELAY, Pending};
pub use typed::TypedCollection;
pub use updater::OperatorUpdater;
