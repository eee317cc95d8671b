//! Temporal cube assembly and Zarr V3 persistence for gridded time series.
//!
//! Granules arrive as raster tiles or self-describing grids. This crate turns
//! them into a single three-dimensional cube (time, latitude, longitude),
//! merges the cube with a previously persisted one, trims it to a trailing
//! duration window and writes the result to a new Zarr store.
//!
//! # Pipeline
//!
//! ```text
//! raster tiles                     previously persisted store
//!      │                                     │
//!      ▼                                     ▼
//! group_granules (filename timestamps)   ZarrReader
//!      │                                     │
//!      ▼                                     │
//! MosaicBuilder ─► GridReprojector           │
//!      │                                     │
//!      ▼                                     │
//! assemble ──────────► consolidate ◄─────────┘
//!                           │
//!                           ▼
//!                      apply_window
//!                           │
//!                           ▼
//!                  ZarrWriter::write_new (create-only)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cube_processor::{consolidate, apply_window, ZarrReader, ZarrWriter};
//!
//! let previous = ZarrReader::default().read_path(&existing)?;
//! let merged = consolidate(new_cube, Some(previous))?;
//! let cube = apply_window(merged.cube, Some(chrono::Duration::days(30)))?;
//! ZarrWriter::new(chunks, compression).write_new(&cube, &destination)?;
//! ```

pub mod assemble;
pub mod cf;
pub mod config;
pub mod consolidate;
pub mod cube;
pub mod error;
pub mod mosaic;
pub mod projection;
pub mod reader;
pub mod remote;
pub mod time;
pub mod timestamp;
pub mod types;
pub mod window;
pub mod writer;

// Re-export commonly used types at crate root
pub use assemble::{assemble, assemble_raster, group_granules, CubeLayout, TimeGroups};
pub use cf::Packing;
pub use config::{AxisNames, ChunkSpec, CompressionConfig, InputFormat, ZarrCompression};
pub use consolidate::{consolidate, Consolidated};
pub use cube::{Coordinate, CoordinateValues, Cube, Variable};
pub use error::{CubeError, Result};
pub use mosaic::{BandMap, MosaicBuilder, RasterSource};
pub use projection::GridReprojector;
pub use reader::ZarrReader;
pub use remote::{open_remote_storage, RemoteStorage, TokioBlockOn};
pub use time::{parse_duration, TimeUnits};
pub use timestamp::{TimestampExtractor, TruncationUnit};
pub use types::{BoundingBox, GridGeometry, RasterTile, ResamplingMethod, SpatialFrame};
pub use window::apply_window;
pub use writer::{claim_destination, ZarrWriteResult, ZarrWriter};
