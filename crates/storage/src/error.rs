//! Error types for object storage and staging.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The object store rejected a request.
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Local filesystem error while staging.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A source locator could not be interpreted.
    #[error("invalid locator '{0}'")]
    InvalidLocator(String),

    /// Nothing was found under a remote prefix.
    #[error("no objects found under {0}")]
    EmptyPrefix(String),

    /// A background download task failed.
    #[error("download task failed: {0}")]
    Task(String),
}
