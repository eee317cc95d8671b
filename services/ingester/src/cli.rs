//! Command line arguments and subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use ingestion::{AccessMode, DatasetConfig, IngestOptions, Ingester, IngestionReport};
use storage::{Locator, ObjectStorageConfig, Stager};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Build consolidated time cubes from raster and NetCDF granules")]
pub struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Directory all outputs are written under
    #[arg(long, global = true, default_value = "output")]
    pub output_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mosaic GeoTIFF granules into a new store
    #[command(name = "cog2zarr")]
    CogToZarr {
        /// Input directory or s3:// prefix
        #[arg(short, long)]
        input: Locator,

        /// Dataset configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Glob selecting granules
        #[arg(short, long, default_value = ingestion::DEFAULT_RASTER_PATTERN)]
        pattern: String,

        #[command(flatten)]
        persist: PersistArgs,
    },

    /// Stack NetCDF granules into a new store
    #[command(name = "cf2zarr")]
    CfToZarr {
        /// Input directory or s3:// prefix
        #[arg(short, long)]
        input: Locator,

        /// Dataset configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Glob selecting granules
        #[arg(short, long, default_value = ingestion::DEFAULT_NETCDF_PATTERN)]
        pattern: String,

        /// Dimension granules are concatenated along
        #[arg(short = 's', long = "concat-dim")]
        concat_dim: Option<String>,

        /// Variables to keep (default: the first data variable)
        #[arg(long, num_args = 1..)]
        variables: Vec<String>,

        #[command(flatten)]
        persist: PersistArgs,
    },

    /// Concatenate existing stores into a new one
    #[command(group(ArgGroup::new("stores").required(true).args(["zarr", "manifest"])))]
    Concat {
        /// Stores to concatenate
        #[arg(short, long, num_args = 1..)]
        zarr: Vec<Locator>,

        /// JSON list of store locators
        #[arg(short, long)]
        manifest: Option<Locator>,

        /// How remote stores are read
        #[arg(long, default_value = "stage")]
        zarr_access: AccessMode,

        /// Time dimension name
        #[arg(short = 't', long = "time-dim")]
        time_dim: Option<String>,

        /// Maximum duration of the result (e.g. P3D, 72h)
        #[arg(short = 'd', long, value_parser = parse_max_duration)]
        max_duration: Option<Duration>,

        /// Dataset configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Name of the new store under the output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write every slice of a store as GeoTIFFs
    Export {
        /// Store to export
        #[arg(short, long)]
        zarr: Locator,

        /// How a remote store is read
        #[arg(long, default_value = "stage")]
        zarr_access: AccessMode,

        /// Dataset configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File name prefix under the output directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Arguments shared by the granule ingest subcommands.
#[derive(Args, Debug)]
pub struct PersistArgs {
    /// Maximum duration of the result (e.g. P3D, 72h)
    #[arg(short = 'd', long, value_parser = parse_max_duration)]
    pub max_duration: Option<Duration>,

    /// Existing store to merge with
    #[arg(long)]
    pub append: Option<Locator>,

    /// How a remote append store is read
    #[arg(long, default_value = "stage")]
    pub store_access: AccessMode,

    /// Name of the new store under the output directory
    #[arg(short, long)]
    pub output: PathBuf,
}

impl PersistArgs {
    fn options(&self, output_dir: &Path) -> IngestOptions {
        let mut options = IngestOptions::new(output_dir.join(&self.output))
            .with_max_duration(self.max_duration);
        if let Some(store) = &self.append {
            options = options.with_append(store.clone(), self.store_access);
        }
        options
    }
}

fn parse_max_duration(s: &str) -> std::result::Result<Duration, String> {
    cube_processor::parse_duration(s).map_err(|e| e.to_string())
}

fn load_config(path: Option<&Path>) -> Result<DatasetConfig> {
    match path {
        Some(path) => DatasetConfig::from_file(path)
            .with_context(|| format!("Failed to load dataset config from {:?}", path)),
        None => {
            info!("No config file provided, using defaults");
            Ok(DatasetConfig::default())
        }
    }
}

fn stager() -> Stager {
    Stager::new(ObjectStorageConfig::from_env())
}

fn log_report(report: &IngestionReport) {
    info!(
        destination = %report.destination.display(),
        steps = report.steps,
        duplicates_dropped = report.duplicates_dropped,
        trimmed = report.trimmed,
        variables = ?report.variables,
        first = report.first_time.as_deref().unwrap_or("-"),
        last = report.last_time.as_deref().unwrap_or("-"),
        "Wrote store"
    );
}

/// Run the selected subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let output_dir = cli.output_dir;
    match cli.command {
        Command::CogToZarr {
            input,
            config,
            pattern,
            persist,
        } => {
            let config = load_config(Some(&config))?;
            let report = Ingester::new(config, stager())
                .cog_to_zarr(&input, &pattern, &persist.options(&output_dir))
                .await
                .with_context(|| format!("cog2zarr failed for {}", input))?;
            log_report(&report);
        }
        Command::CfToZarr {
            input,
            config,
            pattern,
            concat_dim,
            variables,
            persist,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dim) = concat_dim {
                config.dimensions.time = dim;
            }
            if !variables.is_empty() {
                config.variables = variables;
            }
            let report = Ingester::new(config, stager())
                .cf_to_zarr(&input, &pattern, &persist.options(&output_dir))
                .await
                .with_context(|| format!("cf2zarr failed for {}", input))?;
            log_report(&report);
        }
        Command::Concat {
            zarr,
            manifest,
            zarr_access,
            time_dim,
            max_duration,
            config,
            output,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dim) = time_dim {
                config.dimensions.time = dim;
            }
            let mut options =
                IngestOptions::new(output_dir.join(output)).with_max_duration(max_duration);
            options.access = zarr_access;

            let ingester = Ingester::new(config, stager());
            let report = match manifest {
                Some(manifest) => ingester
                    .concat_manifest(&manifest, &options)
                    .await
                    .with_context(|| format!("concat failed for manifest {}", manifest))?,
                None => ingester
                    .concat(&zarr, &options)
                    .await
                    .context("concat failed")?,
            };
            log_report(&report);
        }
        Command::Export {
            zarr,
            zarr_access,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let written = Ingester::new(config, stager())
                .export(&zarr, zarr_access, &output_dir.join(output))
                .await
                .with_context(|| format!("export failed for {}", zarr))?;
            info!(files = written.len(), "Exported GeoTIFFs");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cog2zarr_arguments() {
        let cli = Cli::try_parse_from([
            "ingester",
            "cog2zarr",
            "-i",
            "s3://bucket/granules/",
            "-c",
            "dataset.yaml",
            "-d",
            "P3D",
            "--append",
            "s3://bucket/stores/v1.zarr",
            "--store-access",
            "mount",
            "-o",
            "v2.zarr",
        ])
        .unwrap();
        assert_eq!(cli.output_dir, PathBuf::from("output"));
        assert_eq!(cli.log_format, LogFormat::Pretty);

        let Command::CogToZarr {
            input,
            pattern,
            persist,
            ..
        } = cli.command
        else {
            panic!("expected cog2zarr");
        };
        assert!(input.is_remote());
        assert_eq!(pattern, "*.tif");
        assert_eq!(persist.max_duration, Some(Duration::days(3)));

        let options = persist.options(Path::new("/data/out"));
        assert_eq!(options.destination, PathBuf::from("/data/out/v2.zarr"));
        assert_eq!(options.access, AccessMode::Mount);
        assert!(options.append.is_some());
    }

    #[test]
    fn test_cf2zarr_variables_and_globals() {
        let cli = Cli::try_parse_from([
            "ingester",
            "--log-format",
            "json",
            "--output-dir",
            "/tmp/cubes",
            "cf2zarr",
            "-i",
            "granules",
            "-s",
            "valid_time",
            "--variables",
            "temp",
            "rh",
            "-o",
            "out.zarr",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/cubes"));
        let Command::CfToZarr {
            concat_dim,
            variables,
            pattern,
            config,
            ..
        } = cli.command
        else {
            panic!("expected cf2zarr");
        };
        assert_eq!(concat_dim.as_deref(), Some("valid_time"));
        assert_eq!(variables, vec!["temp".to_string(), "rh".to_string()]);
        assert_eq!(pattern, "*.nc");
        assert!(config.is_none());
    }

    #[test]
    fn test_concat_requires_stores_or_manifest() {
        assert!(Cli::try_parse_from(["ingester", "concat", "-o", "x.zarr"]).is_err());
        assert!(Cli::try_parse_from([
            "ingester", "concat", "-z", "a.zarr", "-m", "list.json", "-o", "x.zarr"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "ingester", "concat", "-z", "a.zarr", "b.zarr", "-t", "t", "-o", "x.zarr",
        ])
        .unwrap();
        let Command::Concat { zarr, time_dim, .. } = cli.command else {
            panic!("expected concat");
        };
        assert_eq!(zarr.len(), 2);
        assert_eq!(time_dim.as_deref(), Some("t"));
    }

    #[test]
    fn test_bad_duration_and_access_rejected() {
        assert!(Cli::try_parse_from([
            "ingester", "concat", "-z", "a.zarr", "-d", "soon", "-o", "x.zarr"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "ingester", "export", "-z", "a.zarr", "--zarr-access", "copy", "-o", "x"
        ])
        .is_err());
    }
}
