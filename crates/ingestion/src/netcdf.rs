//! NetCDF granules to cube: open each granule and stack along time.

use std::path::PathBuf;

use cube_processor::{Cube, CubeError};
use granule_reader::NetCdfGranuleReader;
use tracing::{debug, info};

use crate::config::DatasetConfig;
use crate::error::Result;

/// Open every granule in path order and concatenate along time.
///
/// Granules are read one at a time; the HDF5 library underneath is not
/// thread-safe.
pub fn build_netcdf_cube(paths: &[PathBuf], config: &DatasetConfig) -> Result<Cube> {
    let mut reader =
        NetCdfGranuleReader::new(config.dimensions.clone()).with_variables(config.variables.clone());
    if let Some(extractor) = config.timestamp_extractor()? {
        reader = reader.with_timestamp(extractor);
    }

    let mut cube: Option<Cube> = None;
    for path in paths {
        let granule = reader.read(path)?;
        debug!(path = %path.display(), steps = granule.time_len(), "Read granule");
        cube = Some(match cube {
            Some(acc) => acc.concat_time(&granule)?,
            None => granule,
        });
    }
    let cube = cube.ok_or_else(|| CubeError::EmptyInput("no NetCDF granules".to_string()))?;
    info!(
        granules = paths.len(),
        steps = cube.time_len(),
        variables = ?cube.variable_names(),
        "Stacked NetCDF granules"
    );
    Ok(cube)
}
