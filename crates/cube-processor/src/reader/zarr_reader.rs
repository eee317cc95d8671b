//! Zarr reader for loading persisted cubes.
//!
//! Stores written by [`crate::writer::ZarrWriter`] describe themselves in the
//! root group's consolidated metadata. Stores written by other tools are
//! opened by listing their array directories, which requires a local path.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use zarrs::array::{Array, DataType, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs::storage::ReadableStorageTraits;
use zarrs_filesystem::FilesystemStore;

use crate::cf::Packing;
use crate::config::AxisNames;
use crate::cube::{Coordinate, CoordinateValues, Cube, Variable};
use crate::error::{CubeError, Result};
use crate::time::{TimeUnits, NANOSECONDS_SINCE_EPOCH};
use crate::writer::{ArrayKind, StoreMetadata, CONSOLIDATED_KEY, DIMENSIONS_KEY, TIME_FILL};

/// One array to load, with its dimension names.
#[derive(Debug, Clone)]
struct ArrayPlan {
    name: String,
    dims: Vec<String>,
    kind: ArrayKind,
}

/// Loads cubes from Zarr stores.
#[derive(Debug, Clone, Default)]
pub struct ZarrReader {
    /// Dimension names assumed for arrays that do not record their own.
    fallback_dims: AxisNames,
}

impl ZarrReader {
    pub fn new(fallback_dims: AxisNames) -> Self {
        Self { fallback_dims }
    }

    /// Open a store on the local filesystem.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn read_path(&self, path: &Path) -> Result<Cube> {
        if !path.is_dir() {
            return Err(CubeError::read_failed(format!(
                "store {} does not exist",
                path.display()
            )));
        }
        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| CubeError::Storage(e.to_string()))?,
        );
        let group = open_root(&store)?;
        let plans = match consolidated(group.attributes())? {
            Some(metadata) => plans_from_metadata(&metadata),
            None => {
                debug!("No consolidated metadata, listing arrays");
                self.plans_from_listing(&store, path)?
            }
        };
        self.load(&store, group.attributes(), plans)
    }

    /// Open a store through any readable storage (e.g. a remote bucket).
    ///
    /// The store must carry consolidated metadata.
    pub fn read_storage<S: ReadableStorageTraits + 'static>(&self, storage: Arc<S>) -> Result<Cube> {
        let group = open_root(&storage)?;
        let metadata = consolidated(group.attributes())?.ok_or_else(|| {
            CubeError::invalid_metadata(
                "store has no consolidated metadata; stage it locally to open it",
            )
        })?;
        self.load(&storage, group.attributes(), plans_from_metadata(&metadata))
    }

    fn plans_from_listing<S: ReadableStorageTraits + 'static>(
        &self,
        storage: &Arc<S>,
        path: &Path,
    ) -> Result<Vec<ArrayPlan>> {
        let mut plans = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() || !(dir.join("zarr.json").exists() || dir.join(".zarray").exists()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let array = open_array(storage, &name)?;
            let ndim = array.shape().len();
            let dims = match array.attributes().get(DIMENSIONS_KEY).and_then(string_list) {
                Some(dims) if dims.len() == ndim => dims,
                _ if ndim == 1 => vec![name.clone()],
                _ if ndim == 3 => self
                    .fallback_dims
                    .ordered()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                _ => {
                    warn!(array = %name, ndim, "Skipping array with unsupported rank");
                    continue;
                }
            };
            let kind = if ndim == 1 {
                ArrayKind::Coordinate
            } else {
                ArrayKind::DataVariable
            };
            plans.push(ArrayPlan { name, dims, kind });
        }
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    fn load<S: ReadableStorageTraits + 'static>(
        &self,
        storage: &Arc<S>,
        root_attrs: &Map<String, Value>,
        plans: Vec<ArrayPlan>,
    ) -> Result<Cube> {
        let cube_dims = plans
            .iter()
            .find(|p| p.kind == ArrayKind::DataVariable)
            .map(|p| p.dims.clone())
            .ok_or_else(|| CubeError::invalid_metadata("store has no data variables"))?;
        if cube_dims.len() != 3 {
            return Err(CubeError::invalid_metadata(format!(
                "data variables must be three-dimensional, found {:?}",
                cube_dims
            )));
        }

        let mut arrays = BTreeMap::new();
        for plan in &plans {
            arrays.insert(plan.name.clone(), open_array(storage, &plan.name)?);
        }

        let mut shape = [0usize; 3];
        for plan in plans.iter().filter(|p| p.kind == ArrayKind::DataVariable) {
            if plan.dims != cube_dims {
                return Err(CubeError::invalid_metadata(format!(
                    "variable '{}' has dimensions {:?}, expected {:?}",
                    plan.name, plan.dims, cube_dims
                )));
            }
            for (i, &len) in arrays[&plan.name].shape().iter().enumerate() {
                shape[i] = len as usize;
            }
        }

        let mut cube = Cube::new(
            [cube_dims[0].as_str(), cube_dims[1].as_str(), cube_dims[2].as_str()],
            shape,
        );
        let time_dim = cube_dims[0].clone();

        for plan in &plans {
            let array = &arrays[&plan.name];
            let mut attrs = array.attributes().clone();
            attrs.remove(DIMENSIONS_KEY);

            match plan.kind {
                ArrayKind::Coordinate => {
                    if plan.dims.len() != 1 || cube.dim_len(&plan.dims[0]).is_none() {
                        warn!(coordinate = %plan.name, dims = ?plan.dims, "Skipping non-dimension coordinate");
                        continue;
                    }
                    let values = if plan.dims[0] == time_dim {
                        read_time(array, &mut attrs)?
                    } else {
                        CoordinateValues::Float(read_f64(array)?)
                    };
                    cube.insert_coord(
                        plan.name.clone(),
                        Coordinate {
                            dims: plan.dims.clone(),
                            values,
                            attributes: attrs,
                        },
                    )?;
                }
                ArrayKind::DataVariable => {
                    let mut packing = Packing::from_attributes(&attrs);
                    if packing.fill_value.is_none() {
                        packing.fill_value = fill_value_f64(array);
                    }
                    Packing::strip(&mut attrs);

                    let unpacked = packing.scale_factor == 1.0 && packing.add_offset == 0.0;
                    let (data, fill_value) =
                        if unpacked && matches!(array.data_type(), DataType::Float32) {
                            // Plain float32 data keeps its stored fill value
                            let fill = packing.fill_value.map_or(f32::NAN, |f| f as f32);
                            (read_elements::<S, f32>(array)?, fill)
                        } else {
                            let data = read_f64(array)?
                                .into_iter()
                                .map(|v| packing.unpack(v))
                                .collect();
                            (data, f32::NAN)
                        };
                    cube.insert_variable(
                        plan.name.clone(),
                        Variable {
                            data,
                            fill_value,
                            attributes: attrs,
                        },
                    )?;
                }
            }
        }

        let mut attributes = root_attrs.clone();
        attributes.remove(CONSOLIDATED_KEY);
        cube.attributes = attributes;

        info!(
            steps = cube.time_len(),
            variables = ?cube.variable_names(),
            "Opened Zarr store"
        );
        Ok(cube)
    }
}

fn open_root<S: ReadableStorageTraits + 'static>(storage: &Arc<S>) -> Result<Group<S>> {
    Group::open(storage.clone(), "/").map_err(|e| CubeError::read_failed(e.to_string()))
}

fn open_array<S: ReadableStorageTraits + 'static>(storage: &Arc<S>, name: &str) -> Result<Array<S>> {
    Array::open(storage.clone(), &format!("/{}", name))
        .map_err(|e| CubeError::read_failed(format!("cannot open array '{}': {}", name, e)))
}

fn consolidated(attrs: &Map<String, Value>) -> Result<Option<StoreMetadata>> {
    attrs
        .get(CONSOLIDATED_KEY)
        .map(StoreMetadata::from_json)
        .transpose()
}

fn plans_from_metadata(metadata: &StoreMetadata) -> Vec<ArrayPlan> {
    metadata
        .arrays
        .iter()
        .map(|(name, entry)| ArrayPlan {
            name: name.clone(),
            dims: entry.dims.clone(),
            kind: entry.kind,
        })
        .collect()
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Decode a time coordinate to epoch nanoseconds when it carries units.
fn read_time<S: ReadableStorageTraits + 'static>(
    array: &Array<S>,
    attrs: &mut Map<String, Value>,
) -> Result<CoordinateValues> {
    let Some(units) = attrs.get("units").and_then(Value::as_str).map(str::to_string) else {
        return Ok(CoordinateValues::Float(read_f64(array)?));
    };
    let encoding = TimeUnits::parse(&units)?;

    let values = if matches!(array.data_type(), DataType::Int64) {
        read_elements::<S, i64>(array)?
            .into_iter()
            .map(|v| {
                if v == TIME_FILL {
                    v
                } else {
                    encoding
                        .epoch_nanos
                        .saturating_add(v.saturating_mul(encoding.step_nanos))
                }
            })
            .collect()
    } else {
        read_f64(array)?
            .into_iter()
            .map(|v| encoding.decode(v))
            .collect()
    };

    attrs.insert("units".to_string(), Value::from(NANOSECONDS_SINCE_EPOCH));
    attrs.remove("calendar");
    Ok(CoordinateValues::Time(values))
}

fn read_elements<S: ReadableStorageTraits + 'static, T: ElementOwned>(array: &Array<S>) -> Result<Vec<T>> {
    if array.shape().iter().any(|&n| n == 0) {
        return Ok(Vec::new());
    }
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(|e| CubeError::read_failed(e.to_string()))
}

/// Read any numeric array as f64.
fn read_f64<S: ReadableStorageTraits + 'static>(array: &Array<S>) -> Result<Vec<f64>> {
    fn widen<T: Into<f64> + Copy>(v: Vec<T>) -> Vec<f64> {
        v.into_iter().map(Into::into).collect()
    }
    Ok(match array.data_type() {
        DataType::Float64 => read_elements::<S, f64>(array)?,
        DataType::Float32 => widen(read_elements::<S, f32>(array)?),
        DataType::Int8 => widen(read_elements::<S, i8>(array)?),
        DataType::Int16 => widen(read_elements::<S, i16>(array)?),
        DataType::Int32 => widen(read_elements::<S, i32>(array)?),
        DataType::Int64 => read_elements::<S, i64>(array)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        DataType::UInt8 => widen(read_elements::<S, u8>(array)?),
        DataType::UInt16 => widen(read_elements::<S, u16>(array)?),
        DataType::UInt32 => widen(read_elements::<S, u32>(array)?),
        DataType::UInt64 => read_elements::<S, u64>(array)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        other => {
            return Err(CubeError::invalid_metadata(format!(
                "unsupported data type {:?}",
                other
            )))
        }
    })
}

/// The array's fill value as f64, `None` when NaN or non-numeric.
fn fill_value_f64<S: ReadableStorageTraits + 'static>(array: &Array<S>) -> Option<f64> {
    let bytes = array.fill_value().as_ne_bytes();
    let value = match array.data_type() {
        DataType::Float64 => f64::from_ne_bytes(bytes.try_into().ok()?),
        DataType::Float32 => f32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int8 => i8::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int16 => i16::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int32 => i32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::Int64 => i64::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt8 => u8::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt16 => u16::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt32 => u32::from_ne_bytes(bytes.try_into().ok()?) as f64,
        DataType::UInt64 => u64::from_ne_bytes(bytes.try_into().ok()?) as f64,
        _ => return None,
    };
    (!value.is_nan()).then_some(value)
}
