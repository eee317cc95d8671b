//! Zarr reader for loading persisted cubes back into memory.

mod zarr_reader;

pub use zarr_reader::ZarrReader;
