//! Stacking of per-timestamp frames into a time cube.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::AxisNames;
use crate::cube::{Coordinate, CoordinateValues, Cube, Variable};
use crate::error::{CubeError, Result};
use crate::mosaic::{BandMap, MosaicBuilder, RasterSource};
use crate::projection::GridReprojector;
use crate::time::{to_nanos, NANOSECONDS_SINCE_EPOCH};
use crate::timestamp::TimestampExtractor;
use crate::types::SpatialFrame;

/// Granule paths grouped by resolved timestamp, each group in path order.
pub type TimeGroups = BTreeMap<DateTime<Utc>, Vec<PathBuf>>;

/// Resolve every granule's timestamp and group them.
///
/// The first granule whose name does not match aborts grouping.
pub fn group_granules(paths: &[PathBuf], extractor: &TimestampExtractor) -> Result<TimeGroups> {
    let mut groups = TimeGroups::new();
    for path in paths {
        let ts = extractor.extract(path)?;
        groups.entry(ts).or_default().push(path.clone());
    }
    for paths in groups.values_mut() {
        paths.sort();
    }
    debug!(granules = paths.len(), groups = groups.len(), "Grouped granules by timestamp");
    Ok(groups)
}

/// Names used for the assembled cube's dimensions and coordinates.
#[derive(Debug, Clone, Default)]
pub struct CubeLayout {
    pub dimensions: AxisNames,
    pub coordinates: AxisNames,
}

/// Stack frames into a cube ordered by ascending timestamp.
///
/// All frames must share geometry and variable set. Latitude and longitude
/// coordinates are taken from the pixel centres of the shared grid.
pub fn assemble(frames: BTreeMap<DateTime<Utc>, SpatialFrame>, layout: &CubeLayout) -> Result<Cube> {
    let (_, first) = frames
        .iter()
        .next()
        .ok_or_else(|| CubeError::EmptyInput("no frames to assemble".to_string()))?;
    let geometry = first.geometry;
    let names: Vec<&String> = first.variables.keys().collect();
    let nodata = first.nodata;

    for (ts, frame) in &frames {
        if !frame.geometry.approx_eq(&geometry) {
            return Err(CubeError::GridMismatch(format!(
                "frame at {} has geometry {:?}, expected {:?}",
                ts, frame.geometry, geometry
            )));
        }
        if !frame.variables.keys().eq(names.iter().copied()) {
            return Err(CubeError::GridMismatch(format!(
                "frame at {} has variables {:?}, expected {:?}",
                ts,
                frame.variables.keys().collect::<Vec<_>>(),
                names
            )));
        }
    }

    let dims = &layout.dimensions;
    let coords = &layout.coordinates;
    let mut cube = Cube::new(
        [dims.time.as_str(), dims.latitude.as_str(), dims.longitude.as_str()],
        [frames.len(), geometry.height, geometry.width],
    );

    let times: Vec<i64> = frames.keys().map(to_nanos).collect();
    cube.insert_coord(
        coords.time.clone(),
        Coordinate::new(dims.time.clone(), CoordinateValues::Time(times))
            .with_attribute("units", NANOSECONDS_SINCE_EPOCH)
            .with_attribute("standard_name", "time"),
    )?;
    cube.insert_coord(
        coords.latitude.clone(),
        Coordinate::new(dims.latitude.clone(), CoordinateValues::Float(geometry.lat_centers()))
            .with_attribute("units", "degrees_north")
            .with_attribute("standard_name", "latitude"),
    )?;
    cube.insert_coord(
        coords.longitude.clone(),
        Coordinate::new(dims.longitude.clone(), CoordinateValues::Float(geometry.lon_centers()))
            .with_attribute("units", "degrees_east")
            .with_attribute("standard_name", "longitude"),
    )?;

    let frame_len = geometry.len();
    for name in names {
        let mut data = Vec::with_capacity(frames.len() * frame_len);
        for frame in frames.values() {
            data.extend_from_slice(&frame.variables[name]);
        }
        let mut var = Variable::new(data, nodata);
        var.attributes
            .insert("grid_mapping".to_string(), Value::from("crs"));
        cube.insert_variable(name.clone(), var)?;
    }
    cube.attributes
        .insert("crs".to_string(), Value::from(first.crs.clone()));

    Ok(cube)
}

/// Raster path: mosaic and reproject every time group in parallel, then
/// assemble the cube.
pub fn assemble_raster(
    groups: &TimeGroups,
    source: &dyn RasterSource,
    band_map: &BandMap,
    reprojector: &GridReprojector,
    layout: &CubeLayout,
) -> Result<Cube> {
    if groups.is_empty() {
        return Err(CubeError::EmptyInput("no granules to mosaic".to_string()));
    }
    info!(
        groups = groups.len(),
        width = reprojector.target().width,
        height = reprojector.target().height,
        "Building per-timestamp mosaics"
    );

    let builder = MosaicBuilder::new(source, band_map);
    let frames = groups
        .par_iter()
        .map(|(ts, paths)| {
            let merged = builder.build(paths)?;
            let frame = reprojector.reproject(&merged);
            debug!(timestamp = %ts, granules = paths.len(), "Mosaicked time step");
            Ok((*ts, frame))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    assemble(frames, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GridGeometry};
    use chrono::TimeZone;

    fn frame(value: f32) -> SpatialFrame {
        let mut f = SpatialFrame::new(
            GridGeometry::new(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 2, 1),
            255.0,
        );
        f.variables.insert("WTR".to_string(), vec![value, value]);
        f
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_assemble_sorts_and_labels() {
        let frames = BTreeMap::from([(ts(2), frame(2.0)), (ts(1), frame(1.0))]);
        let cube = assemble(frames, &CubeLayout::default()).unwrap();

        assert_eq!(cube.shape(), [2, 1, 2]);
        assert_eq!(
            cube.time_values().unwrap(),
            vec![to_nanos(&ts(1)), to_nanos(&ts(2))]
        );
        assert_eq!(cube.frame("WTR", 0).unwrap(), &[1.0, 1.0]);
        assert_eq!(
            cube.coord("longitude").unwrap().values,
            CoordinateValues::Float(vec![0.5, 1.5])
        );
        assert_eq!(cube.variable("WTR").unwrap().fill_value, 255.0);
    }

    #[test]
    fn test_assemble_rejects_empty_and_mismatch() {
        assert!(matches!(
            assemble(BTreeMap::new(), &CubeLayout::default()),
            Err(CubeError::EmptyInput(_))
        ));

        let mut odd = frame(1.0);
        odd.geometry = GridGeometry::new(BoundingBox::new(0.0, 0.0, 4.0, 1.0), 2, 1);
        let frames = BTreeMap::from([(ts(1), frame(1.0)), (ts(2), odd)]);
        assert!(matches!(
            assemble(frames, &CubeLayout::default()),
            Err(CubeError::GridMismatch(_))
        ));

        let mut renamed = frame(1.0);
        renamed.variables = BTreeMap::from([("OTHER".to_string(), vec![1.0, 1.0])]);
        let frames = BTreeMap::from([(ts(1), frame(1.0)), (ts(2), renamed)]);
        assert!(matches!(
            assemble(frames, &CubeLayout::default()),
            Err(CubeError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_group_granules_truncates_into_groups() {
        let extractor = TimestampExtractor::new(
            r"T_(?P<ts>\d{8}T\d{6})",
            "ts",
            "%Y%m%dT%H%M%S",
            Some(crate::timestamp::TruncationUnit::Day),
        )
        .unwrap();
        let paths = vec![
            PathBuf::from("/in/T_20240101T120000_b.tif"),
            PathBuf::from("/in/T_20240101T060000_a.tif"),
            PathBuf::from("/in/T_20240102T000000_a.tif"),
        ];
        let groups = group_granules(&paths, &extractor).unwrap();
        assert_eq!(groups.len(), 2);
        let first = groups.values().next().unwrap();
        assert_eq!(
            first,
            &vec![
                PathBuf::from("/in/T_20240101T060000_a.tif"),
                PathBuf::from("/in/T_20240101T120000_b.tif"),
            ]
        );
    }
}
