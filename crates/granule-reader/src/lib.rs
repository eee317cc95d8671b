//! Granule decoding for the cube pipeline.
//!
//! Two input families are supported:
//!
//! - **GeoTIFF tiles** through [`GeoTiffSource`], which implements
//!   [`cube_processor::RasterSource`] so the mosaic builder can open tiles.
//! - **NetCDF granules** through [`NetCdfGranuleReader`], which opens a CF
//!   file directly as a [`cube_processor::Cube`].
//!
//! [`write_geotiff`] is the inverse of the tile decoder and is used to export
//! cube slices.

pub mod error;
pub mod geotiff;
pub mod netcdf_granule;

pub use error::{GranuleError, GranuleResult};
pub use geotiff::{read_geotiff, write_geotiff, GeoTiffSource};
pub use netcdf_granule::{silence_hdf5_errors, NetCdfGranuleReader};
