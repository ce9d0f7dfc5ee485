//! Error types and result types for persistence operations.
//!
//! Every backend reports failures through [`StoreError`]. Backend specific
//! "zero rows affected" signals are translated into [`StoreError::NotFound`];
//! anything else coming out of a driver is passed through as [`StoreError::Backend`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The target entity does not exist.
    /// The first argument is the table name, the second is the identifier.
    #[error("Resource {1} not found in {0}")]
    NotFound(String, String),
    /// Two filters bind the same indexed key.
    #[error("Incompatible filter: index key {0} is bound more than once")]
    IncompatibleFilter(String),
    /// A list append targeted a field that was never initialized as a list.
    #[error("Field {0} is not initialized")]
    FieldNotInitialized(String),
    /// A transaction plan is empty or exceeds the backend's item limit.
    /// The first argument is the plan length, the second the maximum allowed.
    #[error("Invalid batch size {0}, expected between 1 and {1} items")]
    InvalidBatchSize(usize, usize),
    /// The update targets a field that identifies the entity.
    #[error("Field {0} cannot be updated")]
    ImmutableField(String),
    /// An error occurred in the underlying storage driver.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The identifier cannot be converted to the backend's key encoding.
    #[error("Invalid ID: {0}")]
    InvalidId(String),
    /// The task is already part of the project.
    /// The first argument is the task identifier, the second the project identifier.
    #[error("Task {0} is already associated with project {1}")]
    AlreadyAssociated(String, String),
    /// Serialization/deserialization error when converting between entities and records.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during driver initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

/// A specialized `Result` type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
