//! CF packing conventions shared by the NetCDF and Zarr readers.

use serde_json::{Map, Value};

/// Linear packing applied to stored values: `value * scale + offset`, with
/// an optional raw fill value marking missing samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packing {
    pub scale_factor: f64,
    pub add_offset: f64,
    pub fill_value: Option<f64>,
}

impl Default for Packing {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            add_offset: 0.0,
            fill_value: None,
        }
    }
}

impl Packing {
    /// Read `scale_factor`, `add_offset`, `_FillValue` and `missing_value`
    /// from JSON attributes.
    pub fn from_attributes(attrs: &Map<String, Value>) -> Self {
        let number = |key: &str| attrs.get(key).and_then(as_f64);
        Self {
            scale_factor: number("scale_factor").unwrap_or(1.0),
            add_offset: number("add_offset").unwrap_or(0.0),
            fill_value: number("_FillValue").or_else(|| number("missing_value")),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.scale_factor == 1.0 && self.add_offset == 0.0 && self.fill_value.is_none()
    }

    /// Unpack one raw sample; fill values become NaN.
    pub fn unpack(&self, raw: f64) -> f32 {
        if raw.is_nan() || self.fill_value.map_or(false, |fill| raw == fill) {
            return f32::NAN;
        }
        (raw * self.scale_factor + self.add_offset) as f32
    }

    /// Remove the packing attributes once values have been unpacked.
    pub fn strip(attrs: &mut Map<String, Value>) {
        for key in ["scale_factor", "add_offset", "_FillValue", "missing_value"] {
            attrs.remove(key);
        }
    }
}

/// Numeric attribute value; single-element arrays are unwrapped.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) if items.len() == 1 => as_f64(&items[0]),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_packing_from_attributes() {
        let attrs = json!({"scale_factor": 0.01, "add_offset": 273.15, "_FillValue": [-32768]});
        let packing = Packing::from_attributes(attrs.as_object().unwrap());
        assert_eq!(packing.fill_value, Some(-32768.0));
        assert!((packing.unpack(100.0) - 274.15).abs() < 1e-4);
        assert!(packing.unpack(-32768.0).is_nan());
        assert!(!packing.is_identity());
    }

    #[test]
    fn test_default_is_identity() {
        let packing = Packing::from_attributes(&Map::new());
        assert!(packing.is_identity());
        assert_eq!(packing.unpack(1.5), 1.5);
    }

    #[test]
    fn test_strip() {
        let mut attrs = json!({"scale_factor": 2, "units": "K"}).as_object().unwrap().clone();
        Packing::strip(&mut attrs);
        assert_eq!(attrs.len(), 1);
        assert!(attrs.contains_key("units"));
    }
}
