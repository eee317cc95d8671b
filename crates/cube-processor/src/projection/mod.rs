//! Projection utilities for grid processing.
//!
//! Frames arrive on whatever lat/lon grid their granules use and are
//! resampled onto the canonical EPSG:4326 grid before assembly.

pub mod interpolation;
pub mod reproject;

pub use interpolation::{bilinear_interpolate, cubic_interpolate, nearest_interpolate};
pub use reproject::GridReprojector;
