//! Error types, one enum per concern.
//!
//! Only [`SetupError`] (and [`PipelineError`], which wraps it) is fatal. Fetch,
//! store and source errors are per-item or cleanup failures: they are counted
//! and logged by the component that sees them and never abort a run.

use std::path::PathBuf;

/// Failure before the pipeline starts running. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("output directory does not exist: {}", .0.display())]
    OutDirMissing(PathBuf),
    #[error("output path is not a directory: {}", .0.display())]
    OutDirNotDir(PathBuf),
    #[error("cannot access output directory {}: {source}", path.display())]
    OutDirAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open item source {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("item source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Failure of a single fetch. Counted as `failed`; the item is not retried.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: curl::Error,
    },
    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: curl::Error,
    },
    #[error("bad response from {url}: HTTP {code}")]
    Status { url: String, code: u32 },
    #[error("fetch worker for {url} did not finish: {reason}")]
    Worker { url: String, reason: String },
}

impl FetchError {
    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u32> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure persisting one payload. The payload is lost; the sink keeps going.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store task did not finish: {0}")]
    Task(String),
}

/// Failure closing the item source at shutdown. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("item reader task failed: {0}")]
    ReaderTask(String),
}

/// Outcome error of a whole pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("pipeline coordinator stopped before reporting")]
    CoordinatorLost,
}
