//! Error types for granule decoding.

use cube_processor::CubeError;
use thiserror::Error;

/// Result type for granule reader operations.
pub type GranuleResult<T> = Result<T, GranuleError>;

/// Error types for granule decoding.
#[derive(Error, Debug)]
pub enum GranuleError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// NetCDF library error
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// TIFF decode/encode error
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Missing required variable, dimension or tag
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Error raised while building the cube
    #[error(transparent)]
    Cube(#[from] CubeError),
}

impl GranuleError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData(what.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}
