//! Merging of same-timestamp raster tiles into one spatial frame.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CubeError, Result};
use crate::projection::nearest_interpolate;
use crate::types::{BoundingBox, GridGeometry, RasterTile, SpatialFrame};

/// Decodes a raster granule into band planes.
///
/// Implemented by the GeoTIFF reader; tests substitute in-memory tiles.
pub trait RasterSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<RasterTile>;
}

/// Mapping from 1-based band index to variable name.
pub type BandMap = BTreeMap<usize, String>;

/// Merges the granules of one time group.
pub struct MosaicBuilder<'a> {
    source: &'a dyn RasterSource,
    band_map: &'a BandMap,
}

impl<'a> MosaicBuilder<'a> {
    pub fn new(source: &'a dyn RasterSource, band_map: &'a BandMap) -> Self {
        Self { source, band_map }
    }

    /// Open every granule and merge them into one frame.
    ///
    /// Granules are applied in the given order; later valid pixels overwrite
    /// earlier ones, nodata pixels never overwrite. The output covers the
    /// union of all extents at the first tile's resolution.
    pub fn build(&self, paths: &[PathBuf]) -> Result<SpatialFrame> {
        let first = paths
            .first()
            .ok_or_else(|| CubeError::EmptyInput("time group has no granules".to_string()))?;

        let tiles = paths
            .iter()
            .map(|path| {
                let tile = self.source.open(path)?;
                self.check_bands(path, &tile)?;
                Ok((path, tile))
            })
            .collect::<Result<Vec<_>>>()?;

        let (_, first_tile) = &tiles[0];
        let (res_x, res_y) = first_tile.geometry.resolution();
        if !(res_x > 0.0 && res_y > 0.0) || !res_x.is_finite() || !res_y.is_finite() {
            return Err(CubeError::mosaic(
                first.display().to_string(),
                "tile has a degenerate pixel size",
            ));
        }

        let extent = tiles
            .iter()
            .skip(1)
            .fold(first_tile.geometry.bbox, |acc, (_, t)| acc.union(&t.geometry.bbox));
        let geometry = union_grid(&extent, res_x, res_y);
        let nodata = first_tile.nodata.unwrap_or(f32::NAN);

        let mut frame = SpatialFrame::new(geometry, nodata);
        for name in self.band_map.values() {
            frame
                .variables
                .insert(name.clone(), vec![nodata; geometry.len()]);
        }

        let lon_centers = geometry.lon_centers();
        let lat_centers = geometry.lat_centers();

        for (path, tile) in &tiles {
            let src = &tile.geometry;
            let (col_range, row_range) = window(&geometry, &src.bbox);
            for (&band, name) in self.band_map {
                let plane = &tile.bands[band - 1];
                let Some(out) = frame.variables.get_mut(name) else {
                    continue;
                };
                for row in row_range.clone() {
                    for col in col_range.clone() {
                        let (sx, sy) = src.pixel_position(lon_centers[col], lat_centers[row]);
                        let v = nearest_interpolate(plane, src.width, src.height, sx, sy);
                        if !tile.is_nodata(v) {
                            out[row * geometry.width + col] = v;
                        }
                    }
                }
            }
            debug!(path = %path.display(), width = src.width, height = src.height, "Merged tile");
        }

        Ok(frame)
    }

    fn check_bands(&self, path: &Path, tile: &RasterTile) -> Result<()> {
        if tile.bands.len() != self.band_map.len() {
            return Err(CubeError::mosaic(
                path.display().to_string(),
                format!(
                    "tile has {} bands, band map names {}",
                    tile.bands.len(),
                    self.band_map.len()
                ),
            ));
        }
        let expected = tile.geometry.len();
        if let Some(band) = self.band_map.keys().find(|&&b| b == 0 || b > tile.bands.len()) {
            return Err(CubeError::mosaic(
                path.display().to_string(),
                format!("band {} does not exist", band),
            ));
        }
        if tile.bands.iter().any(|b| b.len() != expected) {
            return Err(CubeError::mosaic(
                path.display().to_string(),
                "band length does not match raster dimensions",
            ));
        }
        Ok(())
    }
}

/// Grid covering `extent`, anchored at its north-west corner.
fn union_grid(extent: &BoundingBox, res_x: f64, res_y: f64) -> GridGeometry {
    let width = (extent.width() / res_x).round().max(1.0) as usize;
    let height = (extent.height() / res_y).round().max(1.0) as usize;
    GridGeometry::new(
        BoundingBox::new(
            extent.min_lon,
            extent.max_lat - height as f64 * res_y,
            extent.min_lon + width as f64 * res_x,
            extent.max_lat,
        ),
        width,
        height,
    )
}

/// Output column and row ranges whose centres fall inside `bbox`.
fn window(
    geometry: &GridGeometry,
    bbox: &BoundingBox,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let (col0, row0) = geometry.pixel_position(bbox.min_lon, bbox.max_lat);
    let (col1, row1) = geometry.pixel_position(bbox.max_lon, bbox.min_lat);
    let clamp = |v: f64, len: usize| v.max(0.0).min(len as f64) as usize;
    (
        clamp(col0.ceil(), geometry.width)..clamp(col1.ceil(), geometry.width),
        clamp(row0.ceil(), geometry.height)..clamp(row1.ceil(), geometry.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves tiles keyed by filename.
    struct MemorySource(BTreeMap<String, RasterTile>);

    impl RasterSource for MemorySource {
        fn open(&self, path: &Path) -> Result<RasterTile> {
            let key = path.file_name().unwrap().to_string_lossy().to_string();
            self.0
                .get(&key)
                .cloned()
                .ok_or_else(|| CubeError::mosaic(key, "not found"))
        }
    }

    fn tile(min_lon: f64, width: usize, values: Vec<f32>) -> RasterTile {
        RasterTile {
            geometry: GridGeometry::new(
                BoundingBox::new(min_lon, 0.0, min_lon + width as f64, 1.0),
                width,
                1,
            ),
            bands: vec![values],
            nodata: Some(255.0),
        }
    }

    fn band_map() -> BandMap {
        BTreeMap::from([(1, "WTR".to_string())])
    }

    #[test]
    fn test_adjacent_tiles_cover_union() {
        let source = MemorySource(BTreeMap::from([
            ("a.tif".to_string(), tile(0.0, 2, vec![1.0, 2.0])),
            ("b.tif".to_string(), tile(2.0, 2, vec![3.0, 4.0])),
        ]));
        let map = band_map();
        let frame = MosaicBuilder::new(&source, &map)
            .build(&[PathBuf::from("a.tif"), PathBuf::from("b.tif")])
            .unwrap();
        assert_eq!(frame.geometry.width, 4);
        assert_eq!(frame.variables["WTR"], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frame.nodata, 255.0);
    }

    #[test]
    fn test_overlap_last_write_wins_except_nodata() {
        let source = MemorySource(BTreeMap::from([
            ("a.tif".to_string(), tile(0.0, 3, vec![1.0, 1.0, 1.0])),
            ("b.tif".to_string(), tile(1.0, 2, vec![9.0, 255.0])),
        ]));
        let map = band_map();
        let frame = MosaicBuilder::new(&source, &map)
            .build(&[PathBuf::from("a.tif"), PathBuf::from("b.tif")])
            .unwrap();
        assert_eq!(frame.variables["WTR"], vec![1.0, 9.0, 1.0]);
    }

    #[test]
    fn test_gap_is_nodata() {
        let source = MemorySource(BTreeMap::from([
            ("a.tif".to_string(), tile(0.0, 1, vec![1.0])),
            ("b.tif".to_string(), tile(2.0, 1, vec![2.0])),
        ]));
        let map = band_map();
        let frame = MosaicBuilder::new(&source, &map)
            .build(&[PathBuf::from("a.tif"), PathBuf::from("b.tif")])
            .unwrap();
        assert_eq!(frame.variables["WTR"], vec![1.0, 255.0, 2.0]);
    }

    #[test]
    fn test_band_count_mismatch() {
        let mut two_band = tile(0.0, 1, vec![1.0]);
        two_band.bands.push(vec![2.0]);
        let source = MemorySource(BTreeMap::from([("a.tif".to_string(), two_band)]));
        let map = band_map();
        let err = MosaicBuilder::new(&source, &map)
            .build(&[PathBuf::from("a.tif")])
            .unwrap_err();
        assert!(matches!(err, CubeError::Mosaic { .. }));
    }

    #[test]
    fn test_unreadable_granule() {
        let source = MemorySource(BTreeMap::new());
        let map = band_map();
        assert!(matches!(
            MosaicBuilder::new(&source, &map).build(&[PathBuf::from("missing.tif")]),
            Err(CubeError::Mosaic { .. })
        ));
        assert!(matches!(
            MosaicBuilder::new(&source, &map).build(&[]),
            Err(CubeError::EmptyInput(_))
        ));
    }
}
