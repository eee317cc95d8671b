//! Raster granules to cube: group by filename timestamp, mosaic, reproject.

use std::path::PathBuf;

use cube_processor::types::RASTER_NODATA;
use cube_processor::{assemble_raster, group_granules, CubeError, Cube, GridReprojector};
use granule_reader::GeoTiffSource;
use tracing::info;

use crate::config::DatasetConfig;
use crate::error::Result;

/// Build a cube from GeoTIFF granules according to `config`.
///
/// The configuration must already be validated for raster input.
pub fn build_raster_cube(paths: &[PathBuf], config: &DatasetConfig) -> Result<Cube> {
    let extractor = config
        .timestamp_extractor()?
        .ok_or_else(|| CubeError::config("raster input needs filename_pattern and timestamp"))?;
    let groups = group_granules(paths, &extractor)?;
    let target = config.target_grid()?;
    let reprojector = GridReprojector::new(target, config.resampling()?, RASTER_NODATA);

    info!(
        granules = paths.len(),
        steps = groups.len(),
        width = target.width,
        height = target.height,
        "Assembling raster cube"
    );
    let cube = assemble_raster(
        &groups,
        &GeoTiffSource,
        &config.band_map,
        &reprojector,
        &config.layout(),
    )?;
    Ok(cube)
}
