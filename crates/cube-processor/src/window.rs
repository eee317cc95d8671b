//! Trailing duration window.

use chrono::Duration;
use tracing::{info, warn};

use crate::cube::Cube;
use crate::error::{CubeError, Result};
use crate::time::{format_nanos, format_span};

/// Trim `cube` so that `last - first <= max_duration`.
///
/// Only leading (oldest) steps are dropped, and only as many as needed. The
/// time axis must already be sorted ascending. A negative duration is a
/// configuration error.
pub fn apply_window(cube: Cube, max_duration: Option<Duration>) -> Result<Cube> {
    let Some(max_duration) = max_duration else {
        return Ok(cube);
    };
    if max_duration < Duration::zero() {
        return Err(CubeError::config(format!(
            "max_duration must not be negative (got {})",
            max_duration
        )));
    }
    let times = cube.time_values()?;
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Ok(cube);
    };

    let limit = max_duration.num_nanoseconds().unwrap_or(i64::MAX);
    let span = |t: i64| last.saturating_sub(t);

    if span(first) <= limit {
        info!(
            steps = times.len(),
            span = %format_span(span(first)),
            "Time series within maximum duration"
        );
        return Ok(cube);
    }

    let mut idx = 0;
    while span(times[idx]) > limit {
        idx += 1;
    }

    let keep: Vec<usize> = (idx..times.len()).collect();
    let trimmed = cube.select_time(&keep);
    warn!(
        dropped = idx,
        kept = keep.len(),
        start = %format_nanos(times[idx]),
        end = %format_nanos(last),
        span = %format_span(span(times[idx])),
        "Trimmed time series to maximum duration"
    );
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{Coordinate, CoordinateValues, Variable};

    const DAY: i64 = 86_400_000_000_000;

    fn daily(days: i64) -> Cube {
        let times: Vec<i64> = (0..days).map(|d| d * DAY).collect();
        let mut c = Cube::new(["time", "y", "x"], [times.len(), 1, 1]);
        let values = times.iter().map(|&t| (t / DAY) as f32).collect();
        c.insert_coord("time", Coordinate::new("time", CoordinateValues::Time(times)))
            .unwrap();
        c.insert_variable("v", Variable::new(values, f32::NAN)).unwrap();
        c
    }

    #[test]
    fn test_no_duration_is_noop() {
        let c = daily(10);
        assert_eq!(apply_window(c.clone(), None).unwrap(), c);
    }

    #[test]
    fn test_trailing_three_days() {
        let out = apply_window(daily(10), Some(Duration::days(3))).unwrap();
        let times = out.time_values().unwrap();
        assert_eq!(times, vec![6 * DAY, 7 * DAY, 8 * DAY, 9 * DAY]);
        assert_eq!(out.variable("v").unwrap().data, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_span_never_exceeds_limit() {
        for hours in [0, 1, 23, 24, 25, 100, 1000] {
            let limit = Duration::hours(hours);
            let out = apply_window(daily(10), Some(limit)).unwrap();
            let times = out.time_values().unwrap();
            assert!(!times.is_empty());
            assert!(times.last().unwrap() - times.first().unwrap() <= limit.num_nanoseconds().unwrap());
            // Only leading steps are dropped
            assert_eq!(*times.last().unwrap(), 9 * DAY);
        }
    }

    #[test]
    fn test_negative_duration_rejected() {
        for limit in [Duration::nanoseconds(-1), Duration::days(-3)] {
            let err = apply_window(daily(5), Some(limit)).unwrap_err();
            assert!(matches!(err, CubeError::ConfigValidation { .. }));
        }
    }

    #[test]
    fn test_zero_duration_keeps_last() {
        let out = apply_window(daily(5), Some(Duration::zero())).unwrap();
        assert_eq!(out.time_values().unwrap(), vec![4 * DAY]);
    }
}
