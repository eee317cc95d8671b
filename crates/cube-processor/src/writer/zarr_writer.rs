//! Zarr V3 writer for persisting cubes.
//!
//! A cube becomes one group with one array per coordinate and data
//! variable. Every array uses the same chunk policy and compressor, and the
//! root group carries a consolidated description of the whole store so
//! readers can open it without listing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs::storage::{ReadableStorageTraits, WritableStorageTraits};
use zarrs_filesystem::FilesystemStore;

use crate::config::{ChunkSpec, CompressionConfig, ZarrCompression};
use crate::cube::{Coordinate, CoordinateValues, Cube};
use crate::error::{CubeError, Result};
use crate::time::NANOSECONDS_SINCE_EPOCH;

/// Root group attribute holding the [`StoreMetadata`] document.
pub const CONSOLIDATED_KEY: &str = "consolidated_metadata";

/// Array attribute listing the array's dimension names.
pub const DIMENSIONS_KEY: &str = "_ARRAY_DIMENSIONS";

/// Fill value of integer time coordinates (NaT).
pub const TIME_FILL: i64 = i64::MIN;

/// Role of an array within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    Coordinate,
    DataVariable,
}

/// Description of one persisted array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayEntry {
    pub kind: ArrayKind,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    /// `None` when the fill value is NaN.
    pub fill_value: Option<f64>,
    pub codec: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Consolidated description of a persisted cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Dimension names in storage order with their lengths.
    pub dims: Vec<(String, u64)>,
    pub arrays: BTreeMap<String, ArrayEntry>,
}

impl StoreMetadata {
    /// Serialize to JSON for storage in the root group.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| CubeError::InvalidMetadata(e.to_string()))
    }
}

/// Result of persisting a cube.
#[derive(Debug)]
pub struct ZarrWriteResult {
    pub metadata: StoreMetadata,
    /// Uncompressed bytes handed to the codec pipeline.
    pub bytes_written: u64,
}

/// Writes cubes as Zarr V3 stores.
#[derive(Debug, Clone)]
pub struct ZarrWriter {
    chunks: ChunkSpec,
    compression: CompressionConfig,
}

impl ZarrWriter {
    pub fn new(chunks: ChunkSpec, compression: CompressionConfig) -> Self {
        Self {
            chunks,
            compression,
        }
    }

    /// Persist `cube` to a new local store at `destination`.
    ///
    /// The destination directory is claimed with a create-only `mkdir`, so an
    /// existing destination fails with `DestinationExists` before anything is
    /// written. Parent directories are created as needed.
    #[instrument(skip(self, cube, destination), fields(destination = %destination.display()))]
    pub fn write_new(&self, cube: &Cube, destination: &Path) -> Result<ZarrWriteResult> {
        claim_destination(destination)?;
        let store = FilesystemStore::new(destination)
            .map_err(|e| CubeError::Storage(e.to_string()))?;
        let result = self.write(Arc::new(store), cube)?;
        info!(
            arrays = result.metadata.arrays.len(),
            bytes = result.bytes_written,
            "Wrote Zarr store"
        );
        Ok(result)
    }

    /// Write `cube` into `storage` rooted at `/`.
    pub fn write<S: ReadableStorageTraits + WritableStorageTraits + 'static>(
        &self,
        storage: Arc<S>,
        cube: &Cube,
    ) -> Result<ZarrWriteResult> {
        let dims: Vec<(String, u64)> = cube
            .dims()
            .iter()
            .zip(cube.shape())
            .map(|(d, len)| (d.clone(), len as u64))
            .collect();
        let dim_len: BTreeMap<&str, u64> = dims.iter().map(|(d, l)| (d.as_str(), *l)).collect();

        let mut arrays = BTreeMap::new();
        let mut bytes_written = 0u64;

        for (name, coord) in cube.coords() {
            let shape: Vec<u64> = coord
                .dims
                .iter()
                .map(|d| dim_len.get(d.as_str()).copied().unwrap_or(0))
                .collect();
            let (entry, bytes) = self.write_coordinate(&storage, name, coord, shape)?;
            bytes_written += bytes;
            arrays.insert(name.clone(), entry);
        }

        let cube_dims: Vec<String> = cube.dims().to_vec();
        let cube_shape: Vec<u64> = dims.iter().map(|(_, l)| *l).collect();
        for (name, var) in cube.data_vars() {
            let chunks = self.chunks.chunk_shape(&cube_dims, &cube_shape);
            let array = self.build_array(
                &storage,
                name,
                &cube_dims,
                cube_shape.clone(),
                chunks.clone(),
                DataType::Float32,
                FillValue::from(var.fill_value),
                4,
                var.attributes.clone(),
            )?;
            bytes_written += store_all(&array, &cube_shape, &var.data)?;
            arrays.insert(
                name.clone(),
                ArrayEntry {
                    kind: ArrayKind::DataVariable,
                    dims: cube_dims.clone(),
                    shape: cube_shape.clone(),
                    chunks,
                    dtype: "float32".to_string(),
                    fill_value: finite(var.fill_value as f64),
                    codec: self.codec_name(),
                    attributes: var.attributes.clone(),
                },
            );
            debug!(variable = %name, "Wrote data variable");
        }

        let metadata = StoreMetadata { dims, arrays };

        let mut attrs = cube.attributes.clone();
        attrs.insert(CONSOLIDATED_KEY.to_string(), metadata.to_json()?);
        let mut group_builder = GroupBuilder::new();
        group_builder.attributes(attrs);
        let group = group_builder
            .build(storage.clone(), "/")
            .map_err(|e| CubeError::zarr(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| CubeError::Storage(e.to_string()))?;

        Ok(ZarrWriteResult {
            metadata,
            bytes_written,
        })
    }

    fn write_coordinate<S: ReadableStorageTraits + WritableStorageTraits + 'static>(
        &self,
        storage: &Arc<S>,
        name: &str,
        coord: &Coordinate,
        shape: Vec<u64>,
    ) -> Result<(ArrayEntry, u64)> {
        let chunks = self.chunks.chunk_shape(&coord.dims, &shape);
        let mut attributes = coord.attributes.clone();
        if matches!(coord.values, CoordinateValues::Time(_)) {
            attributes.insert("units".to_string(), NANOSECONDS_SINCE_EPOCH.into());
        }
        let (data_type, fill, dtype, fill_value) = match &coord.values {
            CoordinateValues::Time(_) => (
                DataType::Int64,
                FillValue::from(TIME_FILL),
                "int64",
                Some(TIME_FILL as f64),
            ),
            CoordinateValues::Float(_) => {
                (DataType::Float64, FillValue::from(f64::NAN), "float64", None)
            }
        };

        let array = self.build_array(
            storage,
            name,
            &coord.dims,
            shape.clone(),
            chunks.clone(),
            data_type,
            fill,
            8,
            attributes.clone(),
        )?;
        let bytes = match &coord.values {
            CoordinateValues::Time(v) => store_all(&array, &shape, v)?,
            CoordinateValues::Float(v) => store_all(&array, &shape, v)?,
        };

        Ok((
            ArrayEntry {
                kind: ArrayKind::Coordinate,
                dims: coord.dims.clone(),
                shape,
                chunks,
                dtype: dtype.to_string(),
                fill_value,
                codec: self.codec_name(),
                attributes,
            },
            bytes,
        ))
    }

    /// Build and store the metadata of one array.
    #[allow(clippy::too_many_arguments)]
    fn build_array<S: ReadableStorageTraits + WritableStorageTraits + 'static>(
        &self,
        storage: &Arc<S>,
        name: &str,
        dims: &[String],
        shape: Vec<u64>,
        chunks: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        typesize: usize,
        mut attrs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Array<S>> {
        attrs.insert(DIMENSIONS_KEY.to_string(), serde_json::json!(dims));

        let chunk_grid: zarrs::array::ChunkGrid = chunks
            .try_into()
            .map_err(|e| CubeError::config(format!("invalid chunk shape for '{}': {:?}", name, e)))?;

        let mut binding = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value);
        let mut builder = binding.attributes(attrs);

        if self.compression.codec != ZarrCompression::None {
            let codec = self.create_compression_codec(typesize)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(storage.clone(), &format!("/{}", name))
            .map_err(|e| CubeError::zarr(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| CubeError::Storage(e.to_string()))?;
        Ok(array)
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(&self, typesize: usize) -> Result<Arc<dyn BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.compression.level)
            .map_err(|_| CubeError::config("Invalid compression level"))?;

        let shuffle = if self.compression.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = self.compression.shuffle.then_some(typesize);

        let compressor = match self.compression.codec {
            ZarrCompression::None => {
                return Err(CubeError::config("No compression configured"));
            }
            ZarrCompression::BloscBlosclz => BloscCompressor::BloscLZ,
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| CubeError::config(e.to_string()))?;

        Ok(Arc::new(codec))
    }

    fn codec_name(&self) -> String {
        match self.compression.codec {
            ZarrCompression::None => "none".to_string(),
            codec => format!(
                "{}(clevel={}, shuffle={})",
                codec, self.compression.level, self.compression.shuffle
            ),
        }
    }
}

/// Create `destination` if and only if it does not exist yet.
pub fn claim_destination(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match std::fs::create_dir(destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
            CubeError::DestinationExists(destination.display().to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Write every element of `array`; returns the uncompressed byte count.
fn store_all<S: ReadableStorageTraits + WritableStorageTraits + 'static, T: Element>(
    array: &Array<S>,
    shape: &[u64],
    data: &[T],
) -> Result<u64> {
    if shape.iter().any(|&n| n == 0) {
        return Ok(0);
    }
    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.to_vec())
        .map_err(|e| CubeError::Storage(e.to_string()))?;
    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| CubeError::Storage(e.to_string()))?;
    Ok(std::mem::size_of_val(data) as u64)
}

fn finite(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}
