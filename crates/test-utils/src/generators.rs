//! Test data generators for creating synthetic gridded time series.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cube_processor::{assemble, BoundingBox, Cube, CubeLayout, GridGeometry, SpatialFrame};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Midnight UTC on 2024-01-01, the epoch of generated series.
pub fn series_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `count` timestamps one hour apart from [`series_start`].
pub fn hourly(count: usize) -> Vec<DateTime<Utc>> {
    (0..count as i64)
        .map(|h| series_start() + Duration::hours(h))
        .collect()
}

/// Timestamps at the given day offsets from [`series_start`].
pub fn days(offsets: &[i64]) -> Vec<DateTime<Utc>> {
    offsets
        .iter()
        .map(|&d| series_start() + Duration::days(d))
        .collect()
}

/// The 3x2 one-degree grid used by small fixtures (10..13 E, 40..42 N).
pub fn small_grid() -> GridGeometry {
    GridGeometry::new(BoundingBox::new(10.0, 40.0, 13.0, 42.0), 3, 2)
}

/// A frame on [`small_grid`] with every cell of `variable` set to `value`.
pub fn uniform_frame(variable: &str, value: f32) -> SpatialFrame {
    let geometry = small_grid();
    let mut frame = SpatialFrame::new(geometry, 255.0);
    frame
        .variables
        .insert(variable.to_string(), vec![value; geometry.len()]);
    frame
}

/// Cube with one uniform step per timestamp.
///
/// The step at `times[i]` is filled with `values[i]`, so tests can tell
/// which source a consolidated step came from.
///
/// # Example
///
/// ```
/// use test_utils::{days, uniform_cube};
///
/// let cube = uniform_cube("temp", &days(&[0, 1]), &[1.0, 2.0]);
/// assert_eq!(cube.shape(), [2, 2, 3]);
/// assert_eq!(cube.frame("temp", 1).unwrap()[0], 2.0);
/// ```
pub fn uniform_cube(variable: &str, times: &[DateTime<Utc>], values: &[f32]) -> Cube {
    assert_eq!(times.len(), values.len(), "one value per timestamp");
    let frames: BTreeMap<_, _> = times
        .iter()
        .zip(values)
        .map(|(ts, &value)| (*ts, uniform_frame(variable, value)))
        .collect();
    assemble(frames, &CubeLayout::default()).unwrap()
}

/// First cell of every step of `variable`.
pub fn step_values(cube: &Cube, variable: &str) -> Vec<f32> {
    (0..cube.time_len())
        .map(|t| cube.frame(variable, t).unwrap()[0])
        .collect()
}
