//! Integration tests: write small CF NetCDF files and open them as cubes.

use std::path::{Path, PathBuf};

use cube_processor::time::to_nanos;
use cube_processor::{AxisNames, CoordinateValues, TimestampExtractor};
use granule_reader::{GranuleError, NetCdfGranuleReader};

use chrono::{TimeZone, Utc};

const LATS: [f64; 2] = [41.5, 40.5];
const LONS: [f64; 3] = [10.5, 11.5, 12.5];

/// Write a granule with `temp` and `rh` on (time, latitude, longitude).
fn write_timed(path: &Path, hours: &[f64]) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", hours.len()).unwrap();
    file.add_dimension("latitude", LATS.len()).unwrap();
    file.add_dimension("longitude", LONS.len()).unwrap();
    file.add_attribute("title", "test granule").unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", "hours since 2024-01-01 00:00:00").unwrap();
    time.put_values(hours, ..).unwrap();

    let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&LATS, ..).unwrap();

    let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
    lon.put_values(&LONS, ..).unwrap();

    let n = hours.len() * LATS.len() * LONS.len();
    let raw: Vec<f64> = (0..n).map(|i| i as f64).collect();

    let mut temp = file
        .add_variable::<f64>("temp", &["time", "latitude", "longitude"])
        .unwrap();
    temp.put_attribute("scale_factor", 0.5f64).unwrap();
    temp.put_attribute("add_offset", 100.0f64).unwrap();
    temp.put_attribute("_FillValue", 0.0f64).unwrap();
    temp.put_attribute("units", "K").unwrap();
    temp.put_values(&raw, ..).unwrap();

    let mut rh = file
        .add_variable::<f64>("rh", &["time", "latitude", "longitude"])
        .unwrap();
    rh.put_values(&raw, ..).unwrap();
}

/// Write a single-time granule with `temp` on (latitude, longitude).
fn write_untimed(path: &Path) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("latitude", LATS.len()).unwrap();
    file.add_dimension("longitude", LONS.len()).unwrap();
    let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
    lat.put_values(&LATS, ..).unwrap();
    let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
    lon.put_values(&LONS, ..).unwrap();
    let mut temp = file
        .add_variable::<f64>("temp", &["latitude", "longitude"])
        .unwrap();
    temp.put_values(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], ..).unwrap();
}

fn scratch(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

#[test]
fn test_reads_first_variable_by_default() {
    let (_dir, path) = scratch("A_20240101T000000Z.nc");
    write_timed(&path, &[0.0, 1.0]);

    let cube = NetCdfGranuleReader::default().read(&path).unwrap();
    assert_eq!(cube.shape(), [2, 2, 3]);
    // "rh" sorts before "temp"
    assert_eq!(cube.variable_names(), vec!["rh".to_string()]);
    assert_eq!(cube.attributes["title"], "test granule");

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
    assert_eq!(cube.time_values().unwrap(), vec![to_nanos(&t0), to_nanos(&t1)]);
    assert_eq!(
        cube.coord("latitude").unwrap().values,
        CoordinateValues::Float(LATS.to_vec())
    );
}

#[test]
fn test_unpacks_selected_variable() {
    let (_dir, path) = scratch("granule.nc");
    write_timed(&path, &[0.0]);

    let cube = NetCdfGranuleReader::default()
        .with_variables(vec!["temp".to_string()])
        .read(&path)
        .unwrap();
    let temp = cube.variable("temp").unwrap();
    // Raw 0 is the fill value
    assert!(temp.data[0].is_nan());
    assert_eq!(temp.data[1], 100.5);
    assert_eq!(temp.data[5], 102.5);
    assert!(!temp.attributes.contains_key("scale_factor"));
    assert_eq!(temp.attributes["units"], "K");
}

#[test]
fn test_unknown_variable_is_reported() {
    let (_dir, path) = scratch("granule.nc");
    write_timed(&path, &[0.0]);

    let err = NetCdfGranuleReader::default()
        .with_variables(vec!["pressure".to_string()])
        .read(&path)
        .unwrap_err();
    assert!(matches!(err, GranuleError::MissingData(msg) if msg.contains("pressure")));
}

#[test]
fn test_untimed_granule_uses_filename_timestamp() {
    let (_dir, path) = scratch("B_20240315T120000Z.nc");
    write_untimed(&path);

    let extractor = TimestampExtractor::new(
        r"B_(?P<ts>\d{8}T\d{6}Z)\.nc",
        "ts",
        "%Y%m%dT%H%M%SZ",
        None,
    )
    .unwrap();
    let cube = NetCdfGranuleReader::new(AxisNames::default())
        .with_timestamp(extractor)
        .read(&path)
        .unwrap();

    let expected = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
    assert_eq!(cube.shape(), [1, 2, 3]);
    assert_eq!(cube.time_values().unwrap(), vec![to_nanos(&expected)]);
    assert_eq!(cube.frame("temp", 0).unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_untimed_granule_without_pattern_fails() {
    let (_dir, path) = scratch("plain.nc");
    write_untimed(&path);
    let err = NetCdfGranuleReader::default().read(&path).unwrap_err();
    assert!(matches!(err, GranuleError::MissingData(_)));
}
