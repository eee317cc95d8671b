//! Ingest pipelines producing consolidated Zarr cubes.
//!
//! Three inputs feed the same tail:
//!
//! - raster granules (GeoTIFF), grouped by filename timestamp, mosaicked and
//!   reprojected onto the configured grid
//! - NetCDF granules, opened directly and stacked along time
//! - existing Zarr stores, concatenated
//!
//! The assembled cube is merged with an optional previously persisted store,
//! trimmed to a trailing duration window and written to a new store. Remote
//! inputs are staged through the `storage` crate. Stores can also be exported
//! back to GeoTIFF slices.

pub mod config;
pub mod discover;
pub mod error;
pub mod export;
mod ingester;
mod netcdf;
mod raster;
pub mod store;

pub use config::{DatasetConfig, TimestampConfig};
pub use discover::{discover, DEFAULT_NETCDF_PATTERN, DEFAULT_RASTER_PATTERN};
pub use error::{IngestionError, Result};
pub use export::export_geotiffs;
pub use ingester::{IngestOptions, Ingester, IngestionReport};
pub use netcdf::build_netcdf_cube;
pub use raster::build_raster_cube;
pub use store::{open_store, read_manifest, AccessMode};
