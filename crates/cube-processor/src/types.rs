//! Core types for cube processing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Coordinate reference system of every frame this engine produces.
pub const EPSG_4326: &str = "EPSG:4326";

/// Nodata sentinel written into reprojected raster frames.
pub const RASTER_NODATA: f32 = 255.0;

/// Tolerance used when comparing grid geometry in degrees.
const GEOMETRY_EPSILON: f64 = 1e-9;

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Get the width in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Get the height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Returns a list of problems with this box, empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.min_lon < self.max_lon) {
            problems.push(format!(
                "bbox min_lon ({}) must be < max_lon ({})",
                self.min_lon, self.max_lon
            ));
        }
        if !(self.min_lat < self.max_lat) {
            problems.push(format!(
                "bbox min_lat ({}) must be < max_lat ({})",
                self.min_lat, self.max_lat
            ));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            problems.push("bbox longitude must lie within [-180, 180]".to_string());
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            problems.push("bbox latitude must lie within [-90, 90]".to_string());
        }
        problems
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        // Global coverage
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// A regular north-up lat/lon grid: extent plus pixel counts.
///
/// Row 0 is the northern edge; columns increase eastward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub bbox: BoundingBox,
    pub width: usize,
    pub height: usize,
}

impl GridGeometry {
    pub fn new(bbox: BoundingBox, width: usize, height: usize) -> Self {
        Self { bbox, width, height }
    }

    /// Build the canonical grid covering `bbox` at `resolution` degrees.
    ///
    /// The north-west corner is anchored and the extent is snapped outward to
    /// a whole number of pixels.
    pub fn from_bbox(bbox: BoundingBox, resolution: f64) -> Self {
        let width = ((bbox.width() / resolution) - GEOMETRY_EPSILON).ceil().max(1.0) as usize;
        let height = ((bbox.height() / resolution) - GEOMETRY_EPSILON).ceil().max(1.0) as usize;
        let snapped = BoundingBox::new(
            bbox.min_lon,
            bbox.max_lat - height as f64 * resolution,
            bbox.min_lon + width as f64 * resolution,
            bbox.max_lat,
        );
        Self::new(snapped, width, height)
    }

    /// Resolution in degrees per pixel (lon, lat).
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.bbox.width() / self.width as f64,
            self.bbox.height() / self.height as f64,
        )
    }

    /// Number of pixels in one frame.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Longitudes of pixel centres, west to east.
    pub fn lon_centers(&self) -> Vec<f64> {
        let (res_x, _) = self.resolution();
        (0..self.width)
            .map(|col| self.bbox.min_lon + (col as f64 + 0.5) * res_x)
            .collect()
    }

    /// Latitudes of pixel centres, north to south.
    pub fn lat_centers(&self) -> Vec<f64> {
        let (_, res_y) = self.resolution();
        (0..self.height)
            .map(|row| self.bbox.max_lat - (row as f64 + 0.5) * res_y)
            .collect()
    }

    /// Fractional source pixel position (col, row) of a geographic point,
    /// measured so that integer values are pixel centres.
    pub fn pixel_position(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (res_x, res_y) = self.resolution();
        (
            (lon - self.bbox.min_lon) / res_x - 0.5,
            (self.bbox.max_lat - lat) / res_y - 0.5,
        )
    }

    /// Geometry equality within a small tolerance.
    pub fn approx_eq(&self, other: &GridGeometry) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.bbox.min_lon - other.bbox.min_lon).abs() < GEOMETRY_EPSILON
            && (self.bbox.min_lat - other.bbox.min_lat).abs() < GEOMETRY_EPSILON
            && (self.bbox.max_lon - other.bbox.max_lon).abs() < GEOMETRY_EPSILON
            && (self.bbox.max_lat - other.bbox.max_lat).abs() < GEOMETRY_EPSILON
    }
}

/// One decoded raster granule: band planes on a north-up grid.
#[derive(Debug, Clone)]
pub struct RasterTile {
    pub geometry: GridGeometry,
    /// One row-major plane per band, band 1 first.
    pub bands: Vec<Vec<f32>>,
    pub nodata: Option<f32>,
}

impl RasterTile {
    /// Whether a sample should be treated as missing.
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.map_or(false, |nd| value == nd)
    }
}

/// One time step of gridded variables on a shared geometry.
#[derive(Debug, Clone)]
pub struct SpatialFrame {
    pub geometry: GridGeometry,
    /// Row-major planes keyed by variable name.
    pub variables: BTreeMap<String, Vec<f32>>,
    pub nodata: f32,
    pub crs: String,
}

impl SpatialFrame {
    pub fn new(geometry: GridGeometry, nodata: f32) -> Self {
        Self {
            geometry,
            variables: BTreeMap::new(),
            nodata,
            crs: EPSG_4326.to_string(),
        }
    }

    /// Whether a sample is the frame's nodata value.
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }
}

/// Resampling method used when reprojecting frames onto the canonical grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Nearest neighbor (preserves exact values).
    #[default]
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
    /// Bicubic (Catmull-Rom) interpolation.
    Cubic,
}

impl std::str::FromStr for ResamplingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            other => Err(format!("unsupported resampling method '{}'", other)),
        }
    }
}

impl std::fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}
