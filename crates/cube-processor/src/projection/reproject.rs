//! Resampling of spatial frames onto the canonical lat/lon grid.

use tracing::debug;

use super::interpolation::sample;
use crate::types::{GridGeometry, ResamplingMethod, SpatialFrame, EPSG_4326};

/// Reprojects frames onto one fixed target grid.
#[derive(Debug, Clone, Copy)]
pub struct GridReprojector {
    target: GridGeometry,
    method: ResamplingMethod,
    nodata: f32,
}

impl GridReprojector {
    /// Create a reprojector that fills uncovered cells with `nodata`.
    pub fn new(target: GridGeometry, method: ResamplingMethod, nodata: f32) -> Self {
        Self {
            target,
            method,
            nodata,
        }
    }

    pub fn target(&self) -> &GridGeometry {
        &self.target
    }

    /// Resample every variable of `frame` onto the target grid.
    ///
    /// Each target cell is sampled at its centre. Cells whose centre lies
    /// outside the source extent, or whose sample is missing, receive the
    /// nodata sentinel.
    pub fn reproject(&self, frame: &SpatialFrame) -> SpatialFrame {
        let src = &frame.geometry;
        let lon_centers = self.target.lon_centers();
        let lat_centers = self.target.lat_centers();

        // Source position of every target column and row; both grids are
        // axis aligned so the mapping is separable.
        let cols: Vec<Option<f64>> = lon_centers
            .iter()
            .map(|&lon| covered(src.pixel_position(lon, src.bbox.max_lat).0, src.width))
            .collect();
        let rows: Vec<Option<f64>> = lat_centers
            .iter()
            .map(|&lat| covered(src.pixel_position(src.bbox.min_lon, lat).1, src.height))
            .collect();

        let mut out = SpatialFrame::new(self.target, self.nodata);
        out.crs = EPSG_4326.to_string();

        for (name, plane) in &frame.variables {
            let masked: Vec<f32> = plane
                .iter()
                .map(|&v| if frame.is_nodata(v) { f32::NAN } else { v })
                .collect();

            let mut data = vec![self.nodata; self.target.len()];
            for (row, sy) in rows.iter().enumerate() {
                let Some(sy) = *sy else { continue };
                for (col, sx) in cols.iter().enumerate() {
                    let Some(sx) = *sx else { continue };
                    let v = sample(self.method, &masked, src.width, src.height, sx, sy);
                    if !v.is_nan() {
                        data[row * self.target.width + col] = v;
                    }
                }
            }
            out.variables.insert(name.clone(), data);
        }

        debug!(
            src_width = src.width,
            src_height = src.height,
            dst_width = self.target.width,
            dst_height = self.target.height,
            method = %self.method,
            "Reprojected frame"
        );
        out
    }
}

/// Source position if it falls within the source pixel extent.
fn covered(pos: f64, len: usize) -> Option<f64> {
    if pos >= -0.5 && pos < len as f64 - 0.5 {
        Some(pos)
    } else {
        None
    }
}
