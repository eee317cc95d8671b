//! Ingest pipelines sharing one consolidate, window and persist tail.

use std::path::{Path, PathBuf};

use chrono::Duration;
use cube_processor::time::format_nanos;
use cube_processor::{
    apply_window, consolidate, Cube, CubeError, InputFormat, ZarrReader, ZarrWriter,
};
use storage::{Locator, StagedDirectory, Stager};
use tracing::{info, instrument, warn};

use crate::config::DatasetConfig;
use crate::discover::discover;
use crate::error::Result;
use crate::export::export_geotiffs;
use crate::netcdf::build_netcdf_cube;
use crate::raster::build_raster_cube;
use crate::store::{open_store, read_manifest, AccessMode};

/// Options shared by every ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// New store to create; must not exist.
    pub destination: PathBuf,
    /// Previously persisted store to merge with.
    pub append: Option<Locator>,
    /// How remote stores are read.
    pub access: AccessMode,
    /// Overrides the configured maximum duration.
    pub max_duration: Option<Duration>,
}

impl IngestOptions {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            append: None,
            access: AccessMode::default(),
            max_duration: None,
        }
    }

    pub fn with_append(mut self, store: Locator, access: AccessMode) -> Self {
        self.append = Some(store);
        self.access = access;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub destination: PathBuf,
    /// Time steps in the persisted cube.
    pub steps: usize,
    /// Duplicate time steps dropped during consolidation.
    pub duplicates_dropped: usize,
    /// Leading steps trimmed by the duration window.
    pub trimmed: usize,
    pub variables: Vec<String>,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
    /// Uncompressed bytes written.
    pub bytes_written: u64,
}

/// Runs ingest pipelines for one dataset configuration.
pub struct Ingester {
    config: DatasetConfig,
    stager: Stager,
}

impl Ingester {
    pub fn new(config: DatasetConfig, stager: Stager) -> Self {
        Self { config, stager }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Raster granules (GeoTIFF) under `input` into a new store.
    #[instrument(skip(self, options), fields(input = %input, destination = %options.destination.display()))]
    pub async fn cog_to_zarr(
        &self,
        input: &Locator,
        pattern: &str,
        options: &IngestOptions,
    ) -> Result<IngestionReport> {
        self.prepare(InputFormat::Raster, options)?;
        let staged = self.stager.stage(input).await?;
        let paths = discover(staged.path(), pattern)?;
        let cube = build_raster_cube(&paths, &self.config)?;
        let report = self.finish(cube, InputFormat::Raster, options).await?;
        staged.close()?;
        Ok(report)
    }

    /// NetCDF granules under `input` into a new store.
    #[instrument(skip(self, options), fields(input = %input, destination = %options.destination.display()))]
    pub async fn cf_to_zarr(
        &self,
        input: &Locator,
        pattern: &str,
        options: &IngestOptions,
    ) -> Result<IngestionReport> {
        self.prepare(InputFormat::NetCdf, options)?;
        let staged = self.stager.stage(input).await?;
        let paths = discover(staged.path(), pattern)?;
        let cube = build_netcdf_cube(&paths, &self.config)?;
        let report = self.finish(cube, InputFormat::NetCdf, options).await?;
        staged.close()?;
        Ok(report)
    }

    /// Concatenate existing stores into a new one.
    #[instrument(skip(self, stores, options), fields(stores = stores.len(), destination = %options.destination.display()))]
    pub async fn concat(&self, stores: &[Locator], options: &IngestOptions) -> Result<IngestionReport> {
        self.prepare(InputFormat::Zarr, options)?;
        let reader = self.reader();
        let mut staged: Vec<StagedDirectory> = Vec::new();
        let mut cube: Option<Cube> = None;
        for store in stores {
            let (next, handle) = open_store(&self.stager, &reader, store, options.access).await?;
            staged.extend(handle);
            cube = Some(match cube {
                Some(acc) => acc.concat_time(&next)?,
                None => next,
            });
        }
        let cube = cube.ok_or_else(|| CubeError::EmptyInput("no stores to concatenate".to_string()))?;
        info!(stores = stores.len(), steps = cube.time_len(), "Opened stores");

        let report = self.finish(cube, InputFormat::Zarr, options).await?;
        for handle in staged {
            handle.close()?;
        }
        Ok(report)
    }

    /// Concatenate the stores listed in a JSON manifest.
    pub async fn concat_manifest(
        &self,
        manifest: &Locator,
        options: &IngestOptions,
    ) -> Result<IngestionReport> {
        let stores = read_manifest(&self.stager, manifest).await?;
        info!(manifest = %manifest, stores = stores.len(), "Read store manifest");
        self.concat(&stores, options).await
    }

    /// Write every slice of a store as GeoTIFFs named after `prefix`.
    #[instrument(skip(self), fields(store = %store, prefix = %prefix.display()))]
    pub async fn export(
        &self,
        store: &Locator,
        access: AccessMode,
        prefix: &Path,
    ) -> Result<Vec<PathBuf>> {
        let (cube, staged) = open_store(&self.stager, &self.reader(), store, access).await?;
        let written = export_geotiffs(&cube, prefix)?;
        if let Some(handle) = staged {
            handle.close()?;
        }
        Ok(written)
    }

    fn reader(&self) -> ZarrReader {
        ZarrReader::new(self.config.dimensions.clone())
    }

    /// Validate the configuration and refuse to start on an existing destination.
    fn prepare(&self, format: InputFormat, options: &IngestOptions) -> Result<()> {
        self.config.validate(format)?;
        if options.destination.exists() {
            return Err(
                CubeError::DestinationExists(options.destination.display().to_string()).into(),
            );
        }
        Ok(())
    }

    /// Merge with the append store, trim to the window and persist.
    async fn finish(
        &self,
        cube: Cube,
        format: InputFormat,
        options: &IngestOptions,
    ) -> Result<IngestionReport> {
        let (previous, staged) = match &options.append {
            Some(store) => {
                let (cube, staged) =
                    open_store(&self.stager, &self.reader(), store, options.access).await?;
                (Some(cube), staged)
            }
            None => (None, None),
        };

        let merged = consolidate(cube, previous)?;
        let before_window = merged.cube.time_len();
        let max_duration = match options.max_duration {
            Some(d) => Some(d),
            None => self.config.max_duration()?,
        };
        let cube = apply_window(merged.cube, max_duration)?;
        let trimmed = before_window - cube.time_len();

        let writer = ZarrWriter::new(self.config.chunks_for(format), self.config.compression.clone());
        let written = writer.write_new(&cube, &options.destination)?;

        if let Some(handle) = staged {
            handle.close()?;
        }

        let times = cube.time_values()?;
        let report = IngestionReport {
            destination: options.destination.clone(),
            steps: cube.time_len(),
            duplicates_dropped: merged.dropped.len(),
            trimmed,
            variables: cube.variable_names(),
            first_time: times.first().map(|&t| format_nanos(t)),
            last_time: times.last().map(|&t| format_nanos(t)),
            bytes_written: written.bytes_written,
        };
        if report.steps == 0 {
            warn!(destination = %report.destination.display(), "Persisted an empty cube");
        }
        info!(
            destination = %report.destination.display(),
            steps = report.steps,
            dropped = report.duplicates_dropped,
            trimmed = report.trimmed,
            bytes = report.bytes_written,
            "Ingest complete"
        );
        Ok(report)
    }
}
