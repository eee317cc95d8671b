//! Export of cube slices as single-band GeoTIFFs.
//!
//! Every `(variable, time)` slice becomes one float32 file named
//! `<prefix>_<YYYY-MM-DDTHHMMSSZ>_<variable>.tif`. Rows are written north-up,
//! so cubes stored with ascending latitude are flipped on the way out.

use std::path::{Path, PathBuf};

use cube_processor::time::from_nanos;
use cube_processor::{BoundingBox, Cube, CoordinateValues, GridGeometry};
use granule_reader::write_geotiff;
use tracing::{debug, info};

use crate::error::{IngestionError, Result};

/// Timestamp format used in exported file names.
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H%M%SZ";

/// Write every slice of `cube` next to `prefix`; returns the files written.
pub fn export_geotiffs(cube: &Cube, prefix: &Path) -> Result<Vec<PathBuf>> {
    let [_, lat_dim, lon_dim] = cube.dims();
    let lats = spatial_values(cube, lat_dim)?;
    let lons = spatial_values(cube, lon_dim)?;
    let ascending = lats.len() > 1 && lats[1] - lats[0] >= 0.0;
    let geometry = geometry_from_centres(&lats, &lons)?;
    let times = cube.time_values()?;

    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| IngestionError::Export(format!("invalid prefix {}", prefix.display())))?;

    let mut written = Vec::new();
    for (name, var) in cube.data_vars() {
        let nodata = (!var.fill_value.is_nan()).then_some(var.fill_value);
        for (t, &nanos) in times.iter().enumerate() {
            let frame = cube
                .frame(name, t)
                .ok_or_else(|| IngestionError::Export(format!("{} has no step {}", name, t)))?;
            let data = if ascending {
                flip_rows(frame, geometry.width)
            } else {
                frame.to_vec()
            };

            let stamp = from_nanos(nanos).format(EXPORT_TIME_FORMAT);
            let path = prefix.with_file_name(format!("{}_{}_{}.tif", stem, stamp, name));
            write_geotiff(&path, &geometry, &data, nodata)?;
            debug!(path = %path.display(), "Exported slice");
            written.push(path);
        }
    }
    info!(files = written.len(), flipped = ascending, "Exported GeoTIFFs");
    Ok(written)
}

/// Values of the coordinate labelling `dim`.
fn spatial_values<'a>(cube: &'a Cube, dim: &str) -> Result<&'a [f64]> {
    cube.coords()
        .values()
        .find(|c| c.is_indexed_by(dim))
        .and_then(|c| match &c.values {
            CoordinateValues::Float(v) => Some(v.as_slice()),
            CoordinateValues::Time(_) => None,
        })
        .ok_or_else(|| IngestionError::Export(format!("no coordinate for dimension '{}'", dim)))
}

/// North-up geometry whose pixel centres are the given coordinates.
fn geometry_from_centres(lats: &[f64], lons: &[f64]) -> Result<GridGeometry> {
    let step = |values: &[f64]| {
        (values.len() > 1).then(|| {
            (values[values.len() - 1] - values[0]).abs() / (values.len() - 1) as f64
        })
    };
    let (res_y, res_x) = match (step(lats), step(lons)) {
        (Some(y), Some(x)) => (y, x),
        (Some(y), None) => (y, y),
        (None, Some(x)) => (x, x),
        (None, None) => {
            return Err(IngestionError::Export(
                "cannot derive resolution from a single pixel".to_string(),
            ))
        }
    };

    let (lat_min, lat_max) = min_max(lats);
    let (lon_min, lon_max) = min_max(lons);
    let bbox = BoundingBox::new(
        lon_min - res_x / 2.0,
        lat_min - res_y / 2.0,
        lon_max + res_x / 2.0,
        lat_max + res_y / 2.0,
    );
    Ok(GridGeometry::new(bbox, lons.len(), lats.len()))
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn flip_rows(frame: &[f32], width: usize) -> Vec<f32> {
    frame
        .chunks_exact(width)
        .rev()
        .flatten()
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cube_processor::time::to_nanos;
    use cube_processor::{Coordinate, Variable};
    use granule_reader::read_geotiff;

    fn cube(lats: Vec<f64>) -> Cube {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut cube = Cube::new(["time", "latitude", "longitude"], [1, 2, 3]);
        cube.insert_coord(
            "time",
            Coordinate::new("time", CoordinateValues::Time(vec![to_nanos(&t)])),
        )
        .unwrap();
        cube.insert_coord("latitude", Coordinate::new("latitude", CoordinateValues::Float(lats)))
            .unwrap();
        cube.insert_coord(
            "longitude",
            Coordinate::new("longitude", CoordinateValues::Float(vec![10.5, 11.5, 12.5])),
        )
        .unwrap();
        cube.insert_variable(
            "temp",
            Variable::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], -9999.0),
        )
        .unwrap();
        cube
    }

    #[test]
    fn test_export_names_and_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out").join("lake");

        let written = export_geotiffs(&cube(vec![41.5, 40.5]), &prefix).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0],
            dir.path().join("out").join("lake_2024-01-02T030405Z_temp.tif")
        );

        let tile = read_geotiff(&written[0]).unwrap();
        let expected = GridGeometry::new(BoundingBox::new(10.0, 40.0, 13.0, 42.0), 3, 2);
        assert!(tile.geometry.approx_eq(&expected));
        assert_eq!(tile.bands[0], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(tile.nodata, Some(-9999.0));
    }

    #[test]
    fn test_ascending_latitude_is_flipped() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_geotiffs(&cube(vec![40.5, 41.5]), &dir.path().join("x")).unwrap();
        let tile = read_geotiff(&written[0]).unwrap();
        assert_eq!(tile.bands[0], vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
        assert_eq!(tile.geometry.bbox.max_lat, 42.0);
    }
}
