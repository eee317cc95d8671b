//! Merging of a new cube with a previously persisted one.

use tracing::{info, warn};

use crate::cube::Cube;
use crate::error::Result;

/// Outcome of consolidation.
#[derive(Debug, Clone)]
pub struct Consolidated {
    pub cube: Cube,
    /// Positions, in the sorted series, of the time steps that were dropped
    /// as duplicates of their predecessor.
    pub dropped: Vec<usize>,
}

/// Concatenate `previous` (if any) before `new`, sort by time and drop
/// adjacent duplicate timestamps.
///
/// The sort is stable, so when a timestamp exists in both cubes the
/// previously persisted step comes first and is the one retained.
pub fn consolidate(new: Cube, previous: Option<Cube>) -> Result<Consolidated> {
    let working = match previous {
        Some(previous) => {
            info!(
                previous_steps = previous.time_len(),
                new_steps = new.time_len(),
                "Concatenating with existing cube"
            );
            previous.concat_time(&new)?
        }
        None => new,
    };

    // Exact labels, so float offsets are never merged by rounding
    let times = &working.time_coordinate()?.values;
    let order = times.stable_order();

    let mut keep = Vec::with_capacity(order.len());
    let mut dropped = Vec::new();
    for (pos, &idx) in order.iter().enumerate() {
        if pos > 0 && times.same_label(order[pos - 1], idx) {
            dropped.push(pos);
        } else {
            keep.push(idx);
        }
    }

    if !dropped.is_empty() {
        let dropped_times: Vec<String> =
            dropped.iter().map(|&pos| times.label(order[pos])).collect();
        warn!(
            count = dropped.len(),
            positions = ?dropped,
            times = ?dropped_times,
            "Dropped duplicate time steps"
        );
    }

    let identity = keep.iter().enumerate().all(|(i, &k)| i == k);
    let cube = if identity && keep.len() == working.time_len() {
        working
    } else {
        working.select_time(&keep)
    };

    info!(steps = cube.time_len(), "Consolidated time series");
    Ok(Consolidated { cube, dropped })
}
