//! Raster inspection and conversion tool.
//!
//! Thin command-line caller of lazy-raster: `info` prints what a file holds
//! without reading its data, `convert` writes it through another backend.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use lazy_raster::{BackendRegistry, RasterConfig};

#[derive(Parser, Debug)]
#[command(name = "raster-tool")]
#[command(about = "Inspect and convert file-backed rasters")]
struct Args {
    /// Log level
    #[arg(long, default_value = "warn", env = "RASTER_TOOL_LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print shape, element type, dimensions and missing value
    Info {
        /// Raster file or store
        path: PathBuf,

        /// Layer to describe in a multi-layer source
        #[arg(short, long)]
        layer: Option<String>,
    },

    /// Write a raster or collection to another path and format
    Convert {
        /// Source raster
        src: PathBuf,

        /// Destination path; its extension selects the backend
        dst: PathBuf,

        /// Convert only this layer of a multi-layer source
        #[arg(short, long)]
        layer: Option<String>,

        /// Per-layer file suffix, once per layer, for backends without collection writes
        #[arg(long = "suffix")]
        suffixes: Vec<String>,

        /// Backend tag to use instead of the destination extension
        #[arg(long)]
        backend: Option<String>,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    let config = RasterConfig::from_env();
    let registry = BackendRegistry::from_config(&config).context("Invalid raster configuration")?;
    info!(backends = ?registry.tags(), compression = %config.zarr_compression, "Loaded configuration");

    match args.command {
        Command::Info { path, layer } => {
            let report = commands::info(&registry, &path, layer.as_deref())?;
            print!("{}", report);
        }
        Command::Convert {
            src,
            dst,
            layer,
            suffixes,
            backend,
        } => {
            let request = commands::ConvertRequest {
                src,
                dst,
                layer,
                suffixes: (!suffixes.is_empty()).then_some(suffixes),
                backend,
            };
            for path in commands::convert(&registry, &request)? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
