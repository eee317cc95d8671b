//! Chunking, compression and naming configuration for persisted cubes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Names of the three cube axes.
///
/// Used both for dimension names and for the coordinate variables that
/// label them; the two maps may differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisNames {
    pub time: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for AxisNames {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
        }
    }
}

impl AxisNames {
    /// Names in storage order (time, latitude, longitude).
    pub fn ordered(&self) -> [&str; 3] {
        [&self.time, &self.latitude, &self.longitude]
    }

    /// Problems with these names, prefixed by `label`.
    pub fn problems(&self, label: &str) -> Vec<String> {
        let mut problems = Vec::new();
        for name in self.ordered() {
            if name.trim().is_empty() {
                problems.push(format!("{} names must not be empty", label));
                break;
            }
        }
        let [t, y, x] = self.ordered();
        if t == y || t == x || y == x {
            problems.push(format!("{} names must be distinct", label));
        }
        problems
    }
}

/// Which ingest path produced a cube; selects the default chunk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Raster tiles mosaicked per timestamp.
    Raster,
    /// NetCDF granules opened directly.
    NetCdf,
    /// Existing Zarr stores concatenated.
    Zarr,
}

/// Chunk length per dimension name.
///
/// Dimensions without an entry are stored as a single chunk along that axis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSpec(pub BTreeMap<String, u64>);

impl ChunkSpec {
    /// Default chunk layout for an input format.
    pub fn default_for(format: InputFormat, dims: &AxisNames) -> Self {
        let (t, y, x) = match format {
            InputFormat::Raster | InputFormat::Zarr => (24, 90, 90),
            InputFormat::NetCdf => (5, 50, 50),
        };
        let mut chunks = BTreeMap::new();
        chunks.insert(dims.time.clone(), t);
        chunks.insert(dims.latitude.clone(), y);
        chunks.insert(dims.longitude.clone(), x);
        Self(chunks)
    }

    /// Chunk shape for an array with the given dimension names and shape.
    ///
    /// Lengths larger than the dimension are clamped; zero-length dimensions
    /// still get a chunk length of one.
    pub fn chunk_shape(&self, dims: &[String], shape: &[u64]) -> Vec<u64> {
        dims.iter()
            .zip(shape)
            .map(|(dim, &len)| {
                let requested = self.0.get(dim).copied().unwrap_or(len);
                requested.min(len).max(1)
            })
            .collect()
    }

    pub fn problems(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, &len)| len == 0)
            .map(|(dim, _)| format!("chunk length for '{}' must be > 0", dim))
            .collect()
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with its native BloscLZ compressor.
    #[default]
    BloscBlosclz,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    BloscZstd,
}

impl std::str::FromStr for ZarrCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "blosc_blosclz" | "blosclz" => Ok(Self::BloscBlosclz),
            "blosc_lz4" | "lz4" => Ok(Self::BloscLz4),
            "blosc_zstd" | "zstd" => Ok(Self::BloscZstd),
            other => Err(format!("unsupported compression codec '{}'", other)),
        }
    }
}

impl ZarrCompression {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscBlosclz => "blosc_blosclz",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compressor applied identically to every persisted array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: ZarrCompression,
    /// Compression level (0-9).
    pub level: u8,
    /// Enable byte shuffle filter.
    pub shuffle: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: ZarrCompression::BloscBlosclz,
            level: 9,
            shuffle: true,
        }
    }
}

impl CompressionConfig {
    pub fn problems(&self) -> Vec<String> {
        if self.level > 9 {
            vec![format!("compression level must be 0-9, got {}", self.level)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunks_per_format() {
        let dims = AxisNames::default();
        let raster = ChunkSpec::default_for(InputFormat::Raster, &dims);
        assert_eq!(raster.0.get("time"), Some(&24));
        assert_eq!(raster.0.get("latitude"), Some(&90));

        let netcdf = ChunkSpec::default_for(InputFormat::NetCdf, &dims);
        assert_eq!(netcdf.0.get("time"), Some(&5));
        assert_eq!(netcdf.0.get("longitude"), Some(&50));
    }

    #[test]
    fn test_chunk_shape_clamps_and_fills() {
        let mut chunks = BTreeMap::new();
        chunks.insert("time".to_string(), 24);
        chunks.insert("latitude".to_string(), 90);
        let spec = ChunkSpec(chunks);

        let dims = vec![
            "time".to_string(),
            "latitude".to_string(),
            "longitude".to_string(),
        ];
        assert_eq!(spec.chunk_shape(&dims, &[3, 180, 360]), vec![3, 90, 360]);
        assert_eq!(spec.chunk_shape(&dims, &[0, 10, 10]), vec![1, 10, 10]);
    }

    #[test]
    fn test_chunk_spec_rejects_zero() {
        let mut chunks = BTreeMap::new();
        chunks.insert("time".to_string(), 0);
        assert_eq!(ChunkSpec(chunks).problems().len(), 1);
    }

    #[test]
    fn test_axis_name_problems() {
        assert!(AxisNames::default().problems("dimensions").is_empty());
        let names = AxisNames {
            time: "t".into(),
            latitude: "t".into(),
            longitude: "".into(),
        };
        assert_eq!(names.problems("dimensions").len(), 2);
    }

    #[test]
    fn test_zarr_compression_from_str() {
        assert_eq!("none".parse::<ZarrCompression>(), Ok(ZarrCompression::None));
        assert_eq!(
            "BLOSC_ZSTD".parse::<ZarrCompression>(),
            Ok(ZarrCompression::BloscZstd)
        );
        assert_eq!(
            "blosclz".parse::<ZarrCompression>(),
            Ok(ZarrCompression::BloscBlosclz)
        );
        assert!("gzip".parse::<ZarrCompression>().is_err());
    }

    #[test]
    fn test_compression_defaults() {
        let config = CompressionConfig::default();
        assert_eq!(config.codec, ZarrCompression::BloscBlosclz);
        assert_eq!(config.level, 9);
        assert!(config.problems().is_empty());
        let bad = CompressionConfig {
            level: 12,
            ..Default::default()
        };
        assert_eq!(bad.problems().len(), 1);
    }
}
