//! Storage access for the ingestion pipeline.
//!
//! Provides:
//! - Source locators (local paths and `s3://` URLs)
//! - An S3 client configured from the environment
//! - Scoped staging of remote prefixes into temporary directories

pub mod error;
pub mod locator;
pub mod object_store;
pub mod staging;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use error::{StorageError, StorageResult};
pub use locator::Locator;
pub use staging::{stage_prefix, StagedDirectory, Stager, DEFAULT_CONCURRENCY};
