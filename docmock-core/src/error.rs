//! Error types and result types for mock database operations.
//!
//! Every failure produced by the engine is one of the [`DocMockError`] variants and
//! travels through the same future or callback channel as a successful result.
//! Use [`DocMockResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The error code a MongoDB server reports for unique index violations.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Represents all possible errors that can occur when interacting with the mock database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocMockError {
    /// A write would leave two documents with the same projection onto a unique index.
    ///
    /// `index` is the position of the offending document or operation inside the
    /// batch that was being written.
    #[error("E11000 duplicate key error index: {namespace}.${index_name}")]
    DuplicateKey {
        namespace: String,
        index_name: String,
        index: usize,
    },
    /// The call is illegal for the current state, such as reconfiguring a cursor that
    /// has already produced results or combining update operators that conflict.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// The call is outside the subset of driver behavior this engine models.
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// A name, projection or sort specification is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The requested collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The collection already exists and strict mode forbids reusing it.
    #[error("Collection {0} already exists. Currently in strict mode.")]
    CollectionExists(String),
    /// The client was closed before the operation executed.
    #[error("Connection closed")]
    ConnectionClosed,
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DocMockError {
    /// Returns the server error code for this error, if a real server would report one.
    pub fn code(&self) -> Option<i32> {
        match self {
            DocMockError::DuplicateKey { .. } => Some(DUPLICATE_KEY_CODE),
            _ => None,
        }
    }

    /// Returns `true` for unique index violations.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DocMockError::DuplicateKey { .. })
    }
}

/// A specialized `Result` type for mock database operations.
pub type DocMockResult<T> = Result<T, DocMockError>;

impl From<BsonError> for DocMockError {
    fn from(err: BsonError) -> Self {
        DocMockError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocMockError {
    fn from(err: SerdeJsonError) -> Self {
        DocMockError::Serialization(err.to_string())
    }
}
