//! Tracing setup for the `fetchpipe` binary.
//!
//! Events go to an append-only file in the XDG state dir. `RUST_LOG`
//! overrides the filter. When the file can't be set up the binary calls
//! [`init_logging_stderr`] instead.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,fetchpipe=debug";
const LOG_FILE_NAME: &str = "fetchpipe.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `$XDG_STATE_HOME/fetchpipe/fetchpipe.log`; the directory is created if needed.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchpipe")?;
    let state_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&state_dir)
        .with_context(|| format!("failed to create log dir: {}", state_dir.display()))?;
    Ok(state_dir.join(LOG_FILE_NAME))
}

fn open_append(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber writing to [`log_file_path`] and returns
/// that path. Fails if the file can't be opened or a subscriber is already set.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_file_path()?;
    let file = open_append(&path)
        .with_context(|| format!("failed to open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber: {}", e))?;

    tracing::info!(path = %path.display(), "logging to file");
    Ok(path)
}

/// Stderr-only subscriber. A no-op if one is already installed.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init();
}
