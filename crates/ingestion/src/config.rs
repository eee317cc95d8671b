//! Dataset configuration loaded from YAML.
//!
//! One file describes how granules of a dataset are named, which bands or
//! variables they carry, the canonical grid they are reprojected onto and how
//! the resulting cube is chunked and compressed. Everything is optional so a
//! NetCDF or concat run can work without a file at all.
//!
//! ```yaml
//! bbox: {min_lon: -180, min_lat: -90, max_lon: 180, max_lat: 90}
//! resolution_deg: 0.1
//! filename_pattern: 'OPERA_(?P<ts>\d{8}T\d{6}Z)_.*\.tif'
//! timestamp: {group: ts, dt_string: '%Y%m%dT%H%M%SZ', round_down_to: day}
//! band_map: {1: WTR}
//! max_duration: P3D
//! ```

use std::path::Path;

use chrono::Duration;
use cube_processor::{
    parse_duration, AxisNames, BandMap, BoundingBox, ChunkSpec, CompressionConfig, CubeError,
    CubeLayout, GridGeometry, InputFormat, ResamplingMethod, TimestampExtractor, TruncationUnit,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// How the timestamp is read out of a filename match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampConfig {
    /// Named capture group holding the timestamp text.
    pub group: String,
    /// strftime-style format of the captured text.
    pub dt_string: String,
    /// Round extracted timestamps down to this unit.
    #[serde(default)]
    pub round_down_to: Option<String>,
}

/// Per-dataset ingest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Chunk length per dimension; the input format's default when absent.
    pub chunks: Option<ChunkSpec>,
    pub dimensions: AxisNames,
    /// Coordinate variable names; same as `dimensions` when absent.
    pub coordinates: Option<AxisNames>,
    /// Extent of the canonical grid.
    pub bbox: BoundingBox,
    pub resolution_deg: Option<f64>,
    pub filename_pattern: Option<String>,
    pub timestamp: Option<TimestampConfig>,
    /// 1-based band index to variable name.
    pub band_map: BandMap,
    pub resampling_method: String,
    /// NetCDF variables to keep.
    pub variables: Vec<String>,
    pub max_duration: Option<String>,
    pub compression: CompressionConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            chunks: None,
            dimensions: AxisNames::default(),
            coordinates: None,
            bbox: BoundingBox::default(),
            resolution_deg: None,
            filename_pattern: None,
            timestamp: None,
            band_map: BandMap::new(),
            resampling_method: "nearest".to_string(),
            variables: Vec::new(),
            max_duration: None,
            compression: CompressionConfig::default(),
        }
    }
}

impl DatasetConfig {
    /// Load a configuration file. Call [`DatasetConfig::validate`] before use.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded dataset configuration");
        Ok(config)
    }

    /// Check every setting the `format` path relies on.
    ///
    /// All problems are collected into a single `ConfigValidation` error.
    pub fn validate(&self, format: InputFormat) -> Result<()> {
        let mut problems = Vec::new();

        if format == InputFormat::Raster {
            match self.resolution_deg {
                Some(res) if res > 0.0 && res.is_finite() => {}
                Some(res) => problems.push(format!("resolution_deg must be > 0, got {}", res)),
                None => problems.push("resolution_deg is required for raster input".to_string()),
            }
            problems.extend(band_map_problems(&self.band_map));
            if self.filename_pattern.is_none() {
                problems.push("filename_pattern is required for raster input".to_string());
            }
            if self.timestamp.is_none() {
                problems.push("timestamp is required for raster input".to_string());
            }
            problems.extend(self.bbox.problems());
        }

        if let Err(e) = self.resampling() {
            problems.extend(flatten(e));
        }
        if let Err(e) = self.timestamp_extractor() {
            problems.extend(flatten(e));
        }
        let paired = self.filename_pattern.is_some() == self.timestamp.is_some();
        if !paired && format != InputFormat::Raster {
            problems.push("filename_pattern and timestamp must be set together".to_string());
        }
        if let Some(chunks) = &self.chunks {
            problems.extend(chunks.problems());
        }
        problems.extend(self.dimensions.problems("dimension"));
        if let Some(coordinates) = &self.coordinates {
            problems.extend(coordinates.problems("coordinate"));
        }
        problems.extend(self.compression.problems());
        if let Err(e) = self.max_duration() {
            problems.extend(flatten(e));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CubeError::ConfigValidation { problems }.into())
        }
    }

    /// Compile the filename timestamp extractor, if one is configured.
    pub fn timestamp_extractor(&self) -> cube_processor::Result<Option<TimestampExtractor>> {
        let (Some(pattern), Some(ts)) = (&self.filename_pattern, &self.timestamp) else {
            return Ok(None);
        };
        let truncate = ts
            .round_down_to
            .as_deref()
            .map(|unit| unit.parse::<TruncationUnit>())
            .transpose()
            .map_err(CubeError::config)?;
        TimestampExtractor::new(pattern, ts.group.clone(), ts.dt_string.clone(), truncate).map(Some)
    }

    pub fn resampling(&self) -> cube_processor::Result<ResamplingMethod> {
        self.resampling_method
            .parse::<ResamplingMethod>()
            .map_err(CubeError::config)
    }

    pub fn max_duration(&self) -> cube_processor::Result<Option<Duration>> {
        self.max_duration.as_deref().map(parse_duration).transpose()
    }

    /// The canonical grid raster frames are reprojected onto.
    pub fn target_grid(&self) -> cube_processor::Result<GridGeometry> {
        let resolution = self
            .resolution_deg
            .filter(|res| *res > 0.0)
            .ok_or_else(|| CubeError::config("resolution_deg must be > 0"))?;
        Ok(GridGeometry::from_bbox(self.bbox, resolution))
    }

    /// Explicit chunks, or the default layout for `format`.
    pub fn chunks_for(&self, format: InputFormat) -> ChunkSpec {
        self.chunks
            .clone()
            .unwrap_or_else(|| ChunkSpec::default_for(format, &self.dimensions))
    }

    pub fn layout(&self) -> CubeLayout {
        CubeLayout {
            dimensions: self.dimensions.clone(),
            coordinates: self
                .coordinates
                .clone()
                .unwrap_or_else(|| self.dimensions.clone()),
        }
    }
}

/// Keys must be exactly 1..=N and names unique and non-empty.
fn band_map_problems(band_map: &BandMap) -> Vec<String> {
    let mut problems = Vec::new();
    if band_map.is_empty() {
        problems.push("band_map must map at least one band".to_string());
        return problems;
    }
    let expected: Vec<usize> = (1..=band_map.len()).collect();
    if !band_map.keys().copied().eq(expected.iter().copied()) {
        problems.push(format!(
            "band_map keys must be 1..{}, got {:?}",
            band_map.len(),
            band_map.keys().collect::<Vec<_>>()
        ));
    }
    let mut names: Vec<&str> = band_map.values().map(String::as_str).collect();
    if names.iter().any(|n| n.trim().is_empty()) {
        problems.push("band_map variable names must not be empty".to_string());
    }
    names.sort_unstable();
    if names.windows(2).any(|w| w[0] == w[1]) {
        problems.push("band_map variable names must be unique".to_string());
    }
    problems
}

fn flatten(err: CubeError) -> Vec<String> {
    match err {
        CubeError::ConfigValidation { problems } => problems,
        other => vec![other.to_string()],
    }
}
