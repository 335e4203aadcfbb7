//! # blobpack-cli
//!
//! Packs a directory tree into a single indexed container and reads
//! resources back out of one.
//!
//! This is the main entry point for the blobpack CLI tool. It handles command
//! parsing, sets up logging and error reporting, and dispatches to the
//! appropriate command handlers.

use blobpack_core::error::{BlobpackError, BlobpackResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Pack files into one indexed blob
#[derive(Parser)]
#[command(name = "blobpack", version, about = "Pack files into one indexed blob")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack a directory into a container
    Pack {
        /// Directory to pack (defaults to the configured base directory)
        dir: Option<PathBuf>,
        /// Container file to write
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
        /// Minify JavaScript and JSON resources before packing
        #[arg(long)]
        minify: bool,
        /// Also write the index as a standalone JSON file
        #[arg(long = "index-out", value_name = "FILE")]
        index_out: Option<PathBuf>,
    },
    /// List the resources in a container
    List {
        bundle: PathBuf,
    },
    /// Extract one resource from a container
    Extract {
        bundle: PathBuf,
        key: String,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    info!("Starting blobpack v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", ErrorFormatter::new().format_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> BlobpackResult<()> {
    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BlobpackError::io("Failed to create async runtime".to_string(), e))?;

    rt.block_on(async {
        let ctx = CommandContext::new().await?;

        commands::dispatch_command(cli.command, &ctx).await
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    // Logs go to stderr so `extract` can stream resource bytes to stdout
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "blobpack_cli={level},blobpack_bundle={level},blobpack_config={level},blobpack_core={level}"
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("blobpack encountered an unexpected error: {}", panic_info);
        eprintln!("blobpack crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
