//! Process-wide logging setup
//!
//! Installs one `tracing` subscriber with two sinks:
//! - console: colored by level
//! - file: plain text, appended across restarts
//!
//! Call [`init`] once at process start; library code only emits events.

use crate::config::LogArgs;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directives appended to the base level to quiet transport chatter
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "h2=warn"];

/// Build the filter: RUST_LOG wins, otherwise `level` plus quiet directives
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level))
}

fn default_filter(level: &str) -> EnvFilter {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_DIRECTIVES.iter().map(|d| d.to_string()));
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Open the log file for appending, creating parent directories
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Install the global subscriber
pub fn init(args: &LogArgs) -> Result<()> {
    let file_layer = match args.file() {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(&args.log_level))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(path) = args.file() {
        tracing::debug!(path = %path.display(), "file logging enabled");
    }
    Ok(())
}
