//! Logging initialization

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Initialize logging
///
/// With `debug`, everything at debug level goes to a temporary log file and
/// its path is returned, leaving stdout clean for graph output. Otherwise
/// logs go to stderr, filtered by RUST_LOG or the configured `level`.
pub fn init_logging(debug: bool, level: &str) -> Result<Option<PathBuf>> {
    if !debug {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return Ok(None);
    }

    // Named temp file that outlives the process; the OS cleans it up
    let (file, path) = tempfile::Builder::new()
        .prefix("kubetopo-")
        .suffix(".log")
        .tempfile()
        .context("Failed to create log file")?
        .keep()
        .context("Failed to keep log file")?;

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_ansi(false) // No ANSI codes in log file
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(Some(path))
}
