//! pantrypal CLI
//!
//! Command-line interface for the PantryPal receipt scanner: run the OCR
//! pipeline on a local photo, or start the HTTP API.
//!
//! Copyright (c) 2025 Michael A Wright

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use core_pipeline::{OcrEngine, ReceiptPipeline, ReceiptUploadResponse};
use pantrypal_server::config::{EngineArgs, LogArgs};
use pantrypal_server::{logging, ServerConfig};
use std::path::{Path, PathBuf};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("BUILT_GIT_COMMIT_HASH"),
    "\nbuilt:  ",
    env!("BUILT_TIME_UTC")
);

#[derive(Parser)]
#[command(name = "pantrypal")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Extract line items from receipt photos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run OCR on a receipt image and print the extracted items as JSON
    Scan {
        /// JPEG or PNG receipt photo
        #[arg(short, long)]
        input: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Serve the HTTP API
    Serve {
        #[command(flatten)]
        config: ServerConfig,
    },

    /// Show build information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            input,
            pretty,
            engine,
            log,
        } => {
            // Initialize tracing
            logging::init(&log)?;

            let pipeline = ReceiptPipeline::new(engine.build_engine()?);
            let response =
                tokio::task::spawn_blocking(move || scan_file(&pipeline, &input)).await??;

            let json = if pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Serve { config } => {
            logging::init(&config.log)?;
            pantrypal_server::serve(config).await
        }
        Commands::Info => {
            println!("pantrypal {}", env!("CARGO_PKG_VERSION"));
            println!("commit:   {}", env!("BUILT_GIT_COMMIT_HASH"));
            println!("built:    {}", env!("BUILT_TIME_UTC"));
            println!("target:   {}", env!("BUILT_TARGET"));
            println!("profile:  {}", env!("BUILT_PROFILE"));
            println!("rustc:    {}", env!("BUILT_RUSTC_VERSION"));
            println!("features: {}", env!("BUILT_FEATURES"));
            Ok(())
        }
    }
}

/// Content type for a receipt file, by extension; JPEG and PNG only
fn content_type_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        _ => bail!(
            "Invalid file type for {}. Only JPEG and PNG are supported.",
            path.display()
        ),
    }
}

/// Read a local receipt and run it through the pipeline
fn scan_file<E: OcrEngine>(
    pipeline: &ReceiptPipeline<E>,
    path: &Path,
) -> Result<ReceiptUploadResponse> {
    let content_type = content_type_for(path)?;
    let data =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = data.len(), "scanning receipt");

    let fragments = pipeline.run(&data);
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ReceiptUploadResponse::processed(
        filename,
        content_type,
        fragments,
    ))
}
