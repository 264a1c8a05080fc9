//! Core types for an in-memory mock of a MongoDB driver.
//!
//! This crate is the core of the docmock project and provides:
//!
//! - **Documents** ([`document`]) - Dot-path access and typed conversion on BSON documents
//! - **Value ordering** ([`compare`]) - MongoDB-style cross-type comparison and equality
//! - **Query seam** ([`query`]) - The predicate evaluator trait and sort specifications
//! - **Update seam** ([`update`]) - The update synthesizer trait
//! - **Identifiers** ([`id`]) - Factories for generated `_id` values
//! - **Indexes** ([`index`]) - Index descriptors and naming
//! - **Options and results** ([`options`], [`results`]) - Per-operation options and driver-shaped results
//! - **Persistence** ([`persist`]) - The snapshot hook called after mutations
//! - **Error handling** ([`error`]) - The error taxonomy shared by every layer
//!
//! # Example
//!
//! ```ignore
//! use docmock_core::document::{DocumentExt, to_document};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User {
//!     name: String,
//!     address: Address,
//! }
//!
//! let doc = to_document(&user)?;
//! assert_eq!(doc.get_path("address.city"), Some(&Bson::from("Oslo")));
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_core;

pub mod compare;
pub mod document;
pub mod error;
pub mod id;
pub mod index;
pub mod options;
pub mod persist;
pub mod query;
pub mod results;
pub mod update;
