//! On-disk fixtures: GeoTIFF tiles, NetCDF granules and Zarr stores.
//!
//! Each writer produces the smallest file the corresponding reader accepts,
//! with values that identify where they came from.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cube_processor::{
    BoundingBox, ChunkSpec, CompressionConfig, Cube, GridGeometry, ZarrWriter,
};
use granule_reader::write_geotiff;

/// Latitudes of NetCDF fixtures, north to south.
pub const NETCDF_LATS: [f64; 2] = [41.5, 40.5];

/// Longitudes of NetCDF fixtures, west to east.
pub const NETCDF_LONS: [f64; 3] = [10.5, 11.5, 12.5];

/// Write a single-band GeoTIFF tile covering `bbox` filled with `value`.
pub fn write_raster_tile(
    dir: &Path,
    name: &str,
    bbox: BoundingBox,
    width: usize,
    height: usize,
    value: f32,
) -> PathBuf {
    let path = dir.join(name);
    let geometry = GridGeometry::new(bbox, width, height);
    write_geotiff(&path, &geometry, &vec![value; geometry.len()], Some(255.0)).unwrap();
    path
}

/// Write a CF granule holding `variable` on (time, latitude, longitude).
///
/// `hours` are offsets from 2024-01-01T00:00:00Z; step `i` is filled with
/// `values[i]`.
pub fn write_netcdf_granule(path: &Path, variable: &str, hours: &[f64], values: &[f64]) {
    assert_eq!(hours.len(), values.len(), "one value per step");
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", hours.len()).unwrap();
    file.add_dimension("latitude", NETCDF_LATS.len()).unwrap();
    file.add_dimension("longitude", NETCDF_LONS.len()).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", "hours since 2024-01-01 00:00:00")
        .unwrap();
    time.put_values(hours, ..).unwrap();

    let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&NETCDF_LATS, ..).unwrap();

    let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&NETCDF_LONS, ..).unwrap();

    let cells = NETCDF_LATS.len() * NETCDF_LONS.len();
    let data: Vec<f64> = values
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(cells))
        .collect();
    let mut var = file
        .add_variable::<f64>(variable, &["time", "latitude", "longitude"])
        .unwrap();
    var.put_values(&data, ..).unwrap();
}

/// Persist `cube` as a new store at `path` with default settings.
pub fn write_store(cube: &Cube, path: &Path) -> PathBuf {
    ZarrWriter::new(ChunkSpec::default(), CompressionConfig::default())
        .write_new(cube, path)
        .unwrap();
    path.to_path_buf()
}

/// Raster granule name in the `OPERA_<YYYYmmddTHHMMSSZ>_<tile>.tif` scheme.
pub fn raster_granule_name(ts: &DateTime<Utc>, tile: &str) -> String {
    format!("OPERA_{}_{}.tif", ts.format("%Y%m%dT%H%M%SZ"), tile)
}

/// A scratch directory removed when dropped.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("cube-test-")
        .tempdir()
        .unwrap()
}
