//! Error types for the ingestion crate.

use cube_processor::CubeError;
use granule_reader::GranuleError;
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error(transparent)]
    Cube(#[from] CubeError),

    #[error("Failed to read granule: {0}")]
    Granule(#[from] GranuleError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Failed to parse manifest: {0}")]
    Manifest(String),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("No input files matched '{pattern}' under {root}")]
    NoInputs { root: String, pattern: String },

    #[error("Export failed: {0}")]
    Export(String),
}

impl IngestionError {
    /// Whether the failure came from configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Cube(CubeError::ConfigValidation { .. }))
    }

    /// Whether the failure is the create-only destination check.
    pub fn is_destination_exists(&self) -> bool {
        matches!(self, Self::Cube(CubeError::DestinationExists(_)))
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
