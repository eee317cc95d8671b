//! NetCDF granules opened directly as cubes.
//!
//! A granule holds one or more gridded variables on `(time, lat, lon)` (or
//! `(lat, lon)` for single-time files). CF time units are decoded to epoch
//! nanoseconds and packed variables are unpacked to `f32`. When the file has
//! no time dimension, the timestamp comes from the filename.

use std::path::Path;
use std::sync::Once;

use cube_processor::time::{to_nanos, NANOSECONDS_SINCE_EPOCH};
use cube_processor::{
    AxisNames, Coordinate, CoordinateValues, Cube, Packing, TimeUnits, TimestampExtractor,
    Variable,
};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::{GranuleError, GranuleResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist). Call early in `main()`; safe to call more
/// than once.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Opens NetCDF granules as single-file cubes.
#[derive(Debug, Clone, Default)]
pub struct NetCdfGranuleReader {
    dimensions: AxisNames,
    variables: Option<Vec<String>>,
    timestamp: Option<TimestampExtractor>,
}

impl NetCdfGranuleReader {
    pub fn new(dimensions: AxisNames) -> Self {
        Self {
            dimensions,
            ..Default::default()
        }
    }

    /// Keep only these data variables. Without a subset the first data
    /// variable (by name) is kept.
    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = (!variables.is_empty()).then_some(variables);
        self
    }

    /// Supply timestamps for granules without a time dimension.
    pub fn with_timestamp(mut self, extractor: TimestampExtractor) -> Self {
        self.timestamp = Some(extractor);
        self
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn read(&self, path: &Path) -> GranuleResult<Cube> {
        silence_hdf5_errors();
        let file = netcdf::open(path)?;
        let dims = &self.dimensions;

        let lat_len = dimension_len(&file, &dims.latitude)?;
        let lon_len = dimension_len(&file, &dims.longitude)?;
        let has_time = file.dimension(&dims.time).is_some();

        let grid_dims: Vec<String> = if has_time {
            dims.ordered().iter().map(|d| d.to_string()).collect()
        } else {
            vec![dims.latitude.clone(), dims.longitude.clone()]
        };

        let mut data_names: Vec<String> = file
            .variables()
            .filter(|v| dimension_names(v) == grid_dims)
            .map(|v| v.name())
            .collect();
        data_names.sort();
        let selected = self.select_variables(&data_names, path)?;

        let (time_name, times) = if has_time {
            read_time_coordinate(&file, &dims.time)?
        } else {
            let extractor = self.timestamp.as_ref().ok_or_else(|| {
                GranuleError::missing(format!(
                    "dimension '{}' in {} and no filename pattern configured",
                    dims.time,
                    path.display()
                ))
            })?;
            let ts = extractor.extract(path)?;
            (dims.time.clone(), vec![to_nanos(&ts)])
        };

        let mut cube = Cube::new(dims.ordered(), [times.len(), lat_len, lon_len]);
        cube.insert_coord(
            time_name,
            Coordinate::new(dims.time.clone(), CoordinateValues::Time(times))
                .with_attribute("units", NANOSECONDS_SINCE_EPOCH),
        )?;
        for dim in [&dims.latitude, &dims.longitude] {
            let (name, coord) = read_spatial_coordinate(&file, dim)?;
            cube.insert_coord(name, coord)?;
        }

        for name in &selected {
            let var = file
                .variable(name)
                .ok_or_else(|| GranuleError::missing(format!("variable '{}'", name)))?;
            let mut attrs = attributes_to_json(var.attributes());
            let packing = Packing::from_attributes(&attrs);
            Packing::strip(&mut attrs);

            let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
            let data = raw.into_iter().map(|v| packing.unpack(v)).collect();
            cube.insert_variable(
                name.clone(),
                Variable {
                    data,
                    fill_value: f32::NAN,
                    attributes: attrs,
                },
            )?;
        }

        cube.attributes = attributes_to_json(file.attributes());
        info!(
            steps = cube.time_len(),
            variables = ?selected,
            "Opened NetCDF granule"
        );
        Ok(cube)
    }

    fn select_variables(&self, available: &[String], path: &Path) -> GranuleResult<Vec<String>> {
        match &self.variables {
            Some(wanted) => {
                let missing: Vec<&String> =
                    wanted.iter().filter(|w| !available.contains(w)).collect();
                if !missing.is_empty() {
                    return Err(GranuleError::missing(format!(
                        "variables {:?} in {} (available: {:?})",
                        missing,
                        path.display(),
                        available
                    )));
                }
                Ok(wanted.clone())
            }
            None => {
                let first = available.first().ok_or_else(|| {
                    GranuleError::missing(format!("gridded variables in {}", path.display()))
                })?;
                debug!(variable = %first, "No variable subset configured, using first");
                Ok(vec![first.clone()])
            }
        }
    }
}

fn dimension_len(file: &netcdf::File, name: &str) -> GranuleResult<usize> {
    file.dimension(name)
        .map(|d| d.len())
        .ok_or_else(|| GranuleError::missing(format!("{} dimension", name)))
}

fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

/// The 1-D variable indexed by `dim`, preferring one named after it.
fn coordinate_variable<'f>(file: &'f netcdf::File, dim: &str) -> Option<netcdf::Variable<'f>> {
    file.variable(dim)
        .filter(|v| dimension_names(v) == [dim])
        .or_else(|| file.variables().find(|v| dimension_names(v) == [dim]))
}

fn read_time_coordinate(file: &netcdf::File, dim: &str) -> GranuleResult<(String, Vec<i64>)> {
    let var = coordinate_variable(file, dim)
        .ok_or_else(|| GranuleError::missing(format!("coordinate variable for '{}'", dim)))?;
    let attrs = attributes_to_json(var.attributes());
    let units = attrs
        .get("units")
        .and_then(Value::as_str)
        .ok_or_else(|| GranuleError::missing(format!("units on time coordinate '{}'", var.name())))?;
    let encoding = TimeUnits::parse(units)?;
    let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
    Ok((var.name(), raw.into_iter().map(|v| encoding.decode(v)).collect()))
}

fn read_spatial_coordinate(file: &netcdf::File, dim: &str) -> GranuleResult<(String, Coordinate)> {
    let var = coordinate_variable(file, dim)
        .ok_or_else(|| GranuleError::missing(format!("coordinate variable for '{}'", dim)))?;
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;
    let mut coord = Coordinate::new(dim, CoordinateValues::Float(values));
    coord.attributes = attributes_to_json(var.attributes());
    Ok((var.name(), coord))
}

fn attributes_to_json<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Map<String, Value> {
    attrs
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), attribute_to_json(value)))
        })
        .collect()
}

fn attribute_to_json(value: netcdf::AttributeValue) -> Value {
    use netcdf::AttributeValue as A;
    match value {
        A::Uchar(v) => v.into(),
        A::Schar(v) => v.into(),
        A::Ushort(v) => v.into(),
        A::Short(v) => v.into(),
        A::Uint(v) => v.into(),
        A::Int(v) => v.into(),
        A::Ulonglong(v) => v.into(),
        A::Longlong(v) => v.into(),
        A::Float(v) => f64::from(v).into(),
        A::Double(v) => v.into(),
        A::Str(v) => v.into(),
        A::Uchars(v) => v.into(),
        A::Schars(v) => v.into(),
        A::Ushorts(v) => v.into(),
        A::Shorts(v) => v.into(),
        A::Uints(v) => v.into(),
        A::Ints(v) => v.into(),
        A::Ulonglongs(v) => v.into(),
        A::Longlongs(v) => v.into(),
        A::Floats(v) => v.into_iter().map(f64::from).collect::<Vec<_>>().into(),
        A::Doubles(v) => v.into(),
        A::Strs(v) => v.into(),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
