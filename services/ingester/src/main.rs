//! Temporal cube ingester.
//!
//! Turns raster (GeoTIFF) or NetCDF granules into consolidated Zarr stores,
//! concatenates existing stores and exports stores back to GeoTIFF slices.
//! Inputs may be local directories or `s3://` prefixes.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::{Cli, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match args.log_format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Pretty => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(true)
                .pretty()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    granule_reader::silence_hdf5_errors();
    info!(output_dir = %args.output_dir.display(), "Starting ingester");

    cli::run(args).await
}
