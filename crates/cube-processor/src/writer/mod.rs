//! Zarr writer for persisting cubes.
//!
//! This module is the last stage of every ingest: it lays out the final cube
//! as a Zarr V3 group with one compressed array per variable.

mod zarr_writer;

pub use zarr_writer::{
    claim_destination, ArrayEntry, ArrayKind, StoreMetadata, ZarrWriteResult, ZarrWriter,
    CONSOLIDATED_KEY, DIMENSIONS_KEY, TIME_FILL,
};
