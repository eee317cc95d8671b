//! In-memory time cube.
//!
//! A [`Cube`] has three named dimensions in storage order `(time, y, x)`,
//! a set of 1-D coordinate variables, and `f32` data variables laid out
//! time-major so that each time step is one contiguous frame.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{CubeError, Result};
use crate::time::format_nanos;

/// Tolerance used when comparing spatial coordinate values.
const COORD_EPSILON: f64 = 1e-9;

/// Values of a 1-D coordinate variable.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateValues {
    /// Epoch nanoseconds.
    Time(Vec<i64>),
    /// Plain floating point labels (degrees, metres, raw time offsets).
    Float(Vec<f64>),
}

impl CoordinateValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as integer timestamps; float labels are truncated toward zero.
    pub fn as_time(&self) -> Vec<i64> {
        match self {
            Self::Time(v) => v.clone(),
            Self::Float(v) => v.iter().map(|&x| x as i64).collect(),
        }
    }

    /// Indices that sort the labels ascending. Equal labels keep their
    /// input order.
    pub fn stable_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match self {
            Self::Time(v) => order.sort_by_key(|&i| v[i]),
            Self::Float(v) => order.sort_by(|&a, &b| v[a].total_cmp(&v[b])),
        }
        order
    }

    /// Whether the labels at `a` and `b` are exactly equal.
    pub fn same_label(&self, a: usize, b: usize) -> bool {
        match self {
            Self::Time(v) => v[a] == v[b],
            Self::Float(v) => v[a] == v[b],
        }
    }

    /// Human readable label at `i`.
    pub fn label(&self, i: usize) -> String {
        match self {
            Self::Time(v) => format_nanos(v[i]),
            Self::Float(v) => v[i].to_string(),
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Self::Time(v) => Self::Time(indices.iter().map(|&i| v[i]).collect()),
            Self::Float(v) => Self::Float(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    fn append(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::Time(a), Self::Time(b)) => a.extend_from_slice(b),
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            _ => {
                return Err(CubeError::IncompatibleCubes(
                    "time coordinate encodings differ".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn approx_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= COORD_EPSILON)
            }
            _ => false,
        }
    }
}

/// A 1-D labelled axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub dims: Vec<String>,
    pub values: CoordinateValues,
    pub attributes: Map<String, Value>,
}

impl Coordinate {
    pub fn new(dim: impl Into<String>, values: CoordinateValues) -> Self {
        Self {
            dims: vec![dim.into()],
            values,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True if this coordinate is indexed by `dim` and nothing else.
    pub fn is_indexed_by(&self, dim: &str) -> bool {
        self.dims.len() == 1 && self.dims[0] == dim
    }
}

/// A gridded data variable spanning every cube dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Time-major samples, `time * y * x` long.
    pub data: Vec<f32>,
    pub fill_value: f32,
    pub attributes: Map<String, Value>,
}

impl Variable {
    pub fn new(data: Vec<f32>, fill_value: f32) -> Self {
        Self {
            data,
            fill_value,
            attributes: Map::new(),
        }
    }
}

/// A time-indexed stack of frames sharing one spatial grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    dims: [String; 3],
    shape: [usize; 3],
    coords: BTreeMap<String, Coordinate>,
    data_vars: BTreeMap<String, Variable>,
    pub attributes: Map<String, Value>,
}

impl Cube {
    /// Create an empty cube with dimension names `(time, y, x)` and their lengths.
    pub fn new(dims: [&str; 3], shape: [usize; 3]) -> Self {
        Self {
            dims: dims.map(str::to_string),
            shape,
            coords: BTreeMap::new(),
            data_vars: BTreeMap::new(),
            attributes: Map::new(),
        }
    }

    pub fn dims(&self) -> &[String; 3] {
        &self.dims
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn time_dim(&self) -> &str {
        &self.dims[0]
    }

    pub fn time_len(&self) -> usize {
        self.shape[0]
    }

    /// Samples in one time step of one variable.
    pub fn frame_len(&self) -> usize {
        self.shape[1] * self.shape[2]
    }

    /// Length of a named dimension.
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim).map(|i| self.shape[i])
    }

    pub fn coords(&self) -> &BTreeMap<String, Coordinate> {
        &self.coords
    }

    pub fn data_vars(&self) -> &BTreeMap<String, Variable> {
        &self.data_vars
    }

    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.data_vars.keys().cloned().collect()
    }

    /// Attach a coordinate, checking its length against its dimension.
    pub fn insert_coord(&mut self, name: impl Into<String>, coord: Coordinate) -> Result<()> {
        let name = name.into();
        if coord.dims.len() != 1 {
            return Err(CubeError::invalid_metadata(format!(
                "coordinate '{}' must be one-dimensional",
                name
            )));
        }
        let expected = self.dim_len(&coord.dims[0]).ok_or_else(|| {
            CubeError::invalid_metadata(format!(
                "coordinate '{}' uses unknown dimension '{}'",
                name, coord.dims[0]
            ))
        })?;
        if coord.values.len() != expected {
            return Err(CubeError::invalid_metadata(format!(
                "coordinate '{}' has {} values, dimension '{}' has {}",
                name,
                coord.values.len(),
                coord.dims[0],
                expected
            )));
        }
        self.coords.insert(name, coord);
        Ok(())
    }

    /// Attach a data variable, checking its length against the cube shape.
    pub fn insert_variable(&mut self, name: impl Into<String>, var: Variable) -> Result<()> {
        let name = name.into();
        let expected = self.shape.iter().product::<usize>();
        if var.data.len() != expected {
            return Err(CubeError::invalid_metadata(format!(
                "variable '{}' has {} samples, cube shape {:?} needs {}",
                name,
                var.data.len(),
                self.shape,
                expected
            )));
        }
        self.data_vars.insert(name, var);
        Ok(())
    }

    /// Keep only the named data variables.
    pub fn retain_variables(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if !self.data_vars.contains_key(name) {
                return Err(CubeError::invalid_metadata(format!(
                    "variable '{}' not found; available: {:?}",
                    name,
                    self.variable_names()
                )));
            }
        }
        self.data_vars.retain(|k, _| names.contains(k));
        Ok(())
    }

    /// Name of the coordinate labelling the time axis.
    ///
    /// A coordinate named after the time dimension wins; otherwise this is
    /// the first coordinate (by name) whose sole dimension is the time
    /// dimension.
    pub fn time_coordinate_name(&self) -> Result<&str> {
        let dim = self.time_dim();
        if let Some((name, coord)) = self.coords.get_key_value(dim) {
            if coord.is_indexed_by(dim) {
                return Ok(name.as_str());
            }
        }
        self.coords
            .iter()
            .find(|(_, c)| c.is_indexed_by(dim))
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| CubeError::AmbiguousTimeCoordinate {
                dim: dim.to_string(),
            })
    }

    /// The coordinate labelling the time axis.
    pub fn time_coordinate(&self) -> Result<&Coordinate> {
        let name = self.time_coordinate_name()?;
        Ok(&self.coords[name])
    }

    /// Time axis as integer timestamps.
    pub fn time_values(&self) -> Result<Vec<i64>> {
        Ok(self.time_coordinate()?.values.as_time())
    }

    /// Frame of one variable at time index `t`.
    pub fn frame(&self, variable: &str, t: usize) -> Option<&[f32]> {
        let frame_len = self.frame_len();
        self.data_vars
            .get(variable)
            .and_then(|v| v.data.get(t * frame_len..(t + 1) * frame_len))
    }

    /// New cube containing the given time steps in the given order.
    pub fn select_time(&self, indices: &[usize]) -> Self {
        let time_dim = self.time_dim().to_string();
        let frame_len = self.frame_len();

        let coords = self
            .coords
            .iter()
            .map(|(name, coord)| {
                let coord = if coord.is_indexed_by(&time_dim) {
                    Coordinate {
                        dims: coord.dims.clone(),
                        values: coord.values.select(indices),
                        attributes: coord.attributes.clone(),
                    }
                } else {
                    coord.clone()
                };
                (name.clone(), coord)
            })
            .collect();

        let data_vars = self
            .data_vars
            .iter()
            .map(|(name, var)| {
                let mut data = Vec::with_capacity(indices.len() * frame_len);
                for &t in indices {
                    data.extend_from_slice(&var.data[t * frame_len..(t + 1) * frame_len]);
                }
                (
                    name.clone(),
                    Variable {
                        data,
                        fill_value: var.fill_value,
                        attributes: var.attributes.clone(),
                    },
                )
            })
            .collect();

        Self {
            dims: self.dims.clone(),
            shape: [indices.len(), self.shape[1], self.shape[2]],
            coords,
            data_vars,
            attributes: self.attributes.clone(),
        }
    }

    /// Append `other`'s time steps after this cube's.
    ///
    /// Both cubes must share dimension names, spatial shape, variable set and
    /// non-time coordinates. Attributes of `self` win.
    pub fn concat_time(mut self, other: &Cube) -> Result<Self> {
        if self.dims != other.dims {
            return Err(CubeError::IncompatibleCubes(format!(
                "dimensions differ: {:?} vs {:?}",
                self.dims, other.dims
            )));
        }
        if self.shape[1..] != other.shape[1..] {
            return Err(CubeError::IncompatibleCubes(format!(
                "spatial shape differs: {:?} vs {:?}",
                &self.shape[1..],
                &other.shape[1..]
            )));
        }
        if !self.data_vars.keys().eq(other.data_vars.keys()) {
            return Err(CubeError::IncompatibleCubes(format!(
                "variables differ: {:?} vs {:?}",
                self.variable_names(),
                other.variable_names()
            )));
        }
        if !self.coords.keys().eq(other.coords.keys()) {
            return Err(CubeError::IncompatibleCubes(format!(
                "coordinates differ: {:?} vs {:?}",
                self.coords.keys().collect::<Vec<_>>(),
                other.coords.keys().collect::<Vec<_>>()
            )));
        }

        let time_dim = self.dims[0].clone();
        for (name, coord) in self.coords.iter_mut() {
            let theirs = &other.coords[name];
            if coord.is_indexed_by(&time_dim) {
                coord.values.append(&theirs.values)?;
            } else if coord.dims != theirs.dims || !coord.values.approx_eq(&theirs.values) {
                return Err(CubeError::IncompatibleCubes(format!(
                    "coordinate '{}' differs between cubes",
                    name
                )));
            }
        }
        for (name, var) in self.data_vars.iter_mut() {
            var.data.extend_from_slice(&other.data_vars[name].data);
        }
        self.shape[0] += other.shape[0];
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(times: &[i64], fill: f32) -> Cube {
        let mut c = Cube::new(["time", "latitude", "longitude"], [times.len(), 1, 2]);
        c.insert_coord("time", Coordinate::new("time", CoordinateValues::Time(times.to_vec())))
            .unwrap();
        c.insert_coord(
            "latitude",
            Coordinate::new("latitude", CoordinateValues::Float(vec![0.5])),
        )
        .unwrap();
        c.insert_coord(
            "longitude",
            Coordinate::new("longitude", CoordinateValues::Float(vec![0.5, 1.5])),
        )
        .unwrap();
        let data = times
            .iter()
            .flat_map(|&t| [t as f32 + fill, t as f32 + fill])
            .collect();
        c.insert_variable("temp", Variable::new(data, f32::NAN)).unwrap();
        c
    }

    #[test]
    fn test_time_coordinate_lookup() {
        let c = cube(&[1, 2], 0.0);
        assert_eq!(c.time_coordinate_name().unwrap(), "time");
        assert_eq!(c.time_values().unwrap(), vec![1, 2]);

        let mut no_time = Cube::new(["time", "y", "x"], [1, 1, 1]);
        no_time
            .insert_variable("v", Variable::new(vec![0.0], f32::NAN))
            .unwrap();
        assert!(matches!(
            no_time.time_coordinate_name(),
            Err(CubeError::AmbiguousTimeCoordinate { .. })
        ));
    }

    #[test]
    fn test_coordinate_named_after_dimension_wins() {
        let mut c = cube(&[5, 6], 0.0);
        c.insert_coord(
            "analysis_time",
            Coordinate::new("time", CoordinateValues::Time(vec![0, 0])),
        )
        .unwrap();
        assert_eq!(c.time_coordinate_name().unwrap(), "time");
        assert_eq!(c.time_values().unwrap(), vec![5, 6]);

        // Without one, the first coordinate on the time dimension is used
        let mut other = Cube::new(["t", "y", "x"], [1, 1, 1]);
        other
            .insert_coord("valid", Coordinate::new("t", CoordinateValues::Time(vec![9])))
            .unwrap();
        other
            .insert_coord("analysis", Coordinate::new("t", CoordinateValues::Time(vec![3])))
            .unwrap();
        assert_eq!(other.time_coordinate_name().unwrap(), "analysis");
    }

    #[test]
    fn test_float_labels_order_exactly() {
        let values = CoordinateValues::Float(vec![1.5, 0.5, 1.0, 1.5]);
        assert_eq!(values.stable_order(), vec![1, 2, 0, 3]);
        assert!(values.same_label(0, 3));
        assert!(!values.same_label(2, 0));
        assert_eq!(values.label(1), "0.5");
    }

    #[test]
    fn test_float_time_is_cast() {
        let mut c = Cube::new(["t", "y", "x"], [2, 1, 1]);
        c.insert_coord("t", Coordinate::new("t", CoordinateValues::Float(vec![1.9, 3.0])))
            .unwrap();
        assert_eq!(c.time_values().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_insert_checks_lengths() {
        let mut c = Cube::new(["time", "y", "x"], [2, 2, 2]);
        assert!(c
            .insert_coord("time", Coordinate::new("time", CoordinateValues::Time(vec![1])))
            .is_err());
        assert!(c
            .insert_coord("bogus", Coordinate::new("z", CoordinateValues::Float(vec![1.0])))
            .is_err());
        assert!(c
            .insert_variable("v", Variable::new(vec![0.0; 7], f32::NAN))
            .is_err());
        assert!(c
            .insert_variable("v", Variable::new(vec![0.0; 8], f32::NAN))
            .is_ok());
    }

    #[test]
    fn test_select_time_reorders_frames() {
        let c = cube(&[10, 20, 30], 0.0);
        let picked = c.select_time(&[2, 0]);
        assert_eq!(picked.shape(), [2, 1, 2]);
        assert_eq!(picked.time_values().unwrap(), vec![30, 10]);
        assert_eq!(picked.frame("temp", 0).unwrap(), &[30.0, 30.0]);
        assert_eq!(picked.frame("temp", 1).unwrap(), &[10.0, 10.0]);
        assert_eq!(picked.coord("longitude"), c.coord("longitude"));
    }

    #[test]
    fn test_concat_time_appends() {
        let merged = cube(&[1, 2], 0.0).concat_time(&cube(&[2, 3], 100.0)).unwrap();
        assert_eq!(merged.time_len(), 4);
        assert_eq!(merged.time_values().unwrap(), vec![1, 2, 2, 3]);
        assert_eq!(merged.frame("temp", 1).unwrap(), &[2.0, 2.0]);
        assert_eq!(merged.frame("temp", 2).unwrap(), &[102.0, 102.0]);
    }

    #[test]
    fn test_concat_rejects_mismatched_cubes() {
        let mut other = cube(&[3], 0.0);
        other
            .insert_variable("precip", Variable::new(vec![0.0, 0.0], f32::NAN))
            .unwrap();
        assert!(matches!(
            cube(&[1], 0.0).concat_time(&other),
            Err(CubeError::IncompatibleCubes(_))
        ));

        let mut shifted = cube(&[3], 0.0);
        shifted
            .insert_coord(
                "longitude",
                Coordinate::new("longitude", CoordinateValues::Float(vec![10.5, 11.5])),
            )
            .unwrap();
        assert!(matches!(
            cube(&[1], 0.0).concat_time(&shifted),
            Err(CubeError::IncompatibleCubes(_))
        ));
    }

    #[test]
    fn test_retain_variables() {
        let mut c = cube(&[1], 0.0);
        c.insert_variable("precip", Variable::new(vec![0.0, 0.0], f32::NAN))
            .unwrap();
        c.retain_variables(&["precip".to_string()]).unwrap();
        assert_eq!(c.variable_names(), vec!["precip".to_string()]);
        assert!(c.retain_variables(&["missing".to_string()]).is_err());
    }
}
