//! Error types for cube processing.

use thiserror::Error;

/// Errors that can occur while assembling, consolidating or persisting a cube.
#[derive(Error, Debug)]
pub enum CubeError {
    /// One or more configuration values are malformed or out of range.
    #[error("invalid configuration: {}", .problems.join("; "))]
    ConfigValidation { problems: Vec<String> },

    /// A granule filename did not match the configured pattern.
    #[error("input {filename} does not match pattern {pattern}")]
    PatternMismatch { filename: String, pattern: String },

    /// The timestamp group of a matching filename could not be parsed.
    #[error("cannot parse timestamp from {filename}: {reason}")]
    TimestampParse { filename: String, reason: String },

    /// No coordinate variable is indexed solely by the time dimension.
    #[error("cannot determine time coordinate for dimension '{dim}'")]
    AmbiguousTimeCoordinate { dim: String },

    /// Nothing to assemble.
    #[error("no input: {0}")]
    EmptyInput(String),

    /// Frames entering the assembler disagree in geometry or variables.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// Cubes cannot be concatenated along time.
    #[error("incompatible cubes: {0}")]
    IncompatibleCubes(String),

    /// A raster granule could not be opened or is structurally inconsistent.
    #[error("mosaic failed for {path}: {reason}")]
    Mosaic { path: String, reason: String },

    /// The destination store already exists.
    #[error("destination already exists: {0}")]
    DestinationExists(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// Failed to read data from a store.
    #[error("failed to read store data: {0}")]
    ReadFailed(String),

    /// Invalid metadata in a store.
    #[error("invalid store metadata: {0}")]
    InvalidMetadata(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CubeError {
    /// Create a ConfigValidation error with a single problem.
    pub fn config(problem: impl Into<String>) -> Self {
        Self::ConfigValidation {
            problems: vec![problem.into()],
        }
    }

    /// Create a Mosaic error.
    pub fn mosaic(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mosaic {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }
}

impl From<std::io::Error> for CubeError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CubeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for cube operations.
pub type Result<T> = std::result::Result<T, CubeError>;
