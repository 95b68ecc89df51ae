//! Item sources: producers of the URL stream.
//!
//! A source writes items into the pool's URL channel and signals end-of-stream
//! by dropping its sender. The pipeline only needs two more things from it: a
//! count of items read (for stats) and a `close` to call at shutdown.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{SetupError, SourceError};
use crate::stats::ReadCounter;

pub trait ItemSource: Send + 'static {
    /// Shared handle to the count of items read from the underlying medium.
    fn read_counter(&self) -> ReadCounter;

    fn items_read(&self) -> u64 {
        self.read_counter().get()
    }

    /// Releases the underlying resource. Called once, after the pool drained.
    fn close(self) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Reads URLs from the first column of a CSV file with a header row.
pub struct CsvSource {
    path: PathBuf,
    read: ReadCounter,
    reader: JoinHandle<()>,
}

impl CsvSource {
    /// Opens `path` and starts streaming items into `urls` on the blocking pool.
    ///
    /// Failing to open the file is a setup error. Everything after that (I/O
    /// errors, cancellation, the pool going away) just ends the stream.
    pub fn open(
        path: &Path,
        urls: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<Self, SetupError> {
        let file = std::fs::File::open(path).map_err(|source| SetupError::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let read = ReadCounter::new();
        let counter = read.clone();
        let reader = tokio::task::spawn_blocking(move || {
            stream_items(file, &urls, &counter, &cancel);
        });
        tracing::info!(path = %path.display(), "csv reader started");
        Ok(Self {
            path: path.to_path_buf(),
            read,
            reader,
        })
    }
}

impl ItemSource for CsvSource {
    fn read_counter(&self) -> ReadCounter {
        self.read.clone()
    }

    async fn close(self) -> Result<(), SourceError> {
        self.reader
            .await
            .map_err(|e| SourceError::ReaderTask(e.to_string()))?;
        let read = self.read.get();
        tracing::info!(path = %self.path.display(), read, "csv reader closed");
        Ok(())
    }
}

/// Reads records until EOF, an I/O error, cancellation, or the receiver goes away.
/// The sender is dropped on return, which ends the stream.
///
/// Records are read as bytes: a row that is not valid UTF-8 is still an item
/// (lossily decoded) and fails later at fetch time like any malformed URL.
/// A row the parser rejects is skipped; only I/O errors end the stream.
fn stream_items<R: io::Read>(
    input: R,
    urls: &mpsc::Sender<String>,
    read: &ReadCounter,
    cancel: &CancellationToken,
) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    match reader.byte_headers() {
        Ok(header) => tracing::debug!(header = ?header, "csv header"),
        Err(e) => {
            tracing::error!(error = %e, "error reading csv header");
            return;
        }
    }

    for record in reader.byte_records() {
        if cancel.is_cancelled() {
            tracing::info!("csv reader cancelled");
            return;
        }
        let record = match record {
            Ok(r) => r,
            Err(e) if e.is_io_error() => {
                tracing::error!(error = %e, "error reading csv file");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparsable csv record");
                continue;
            }
        };
        let Some(field) = record.get(0) else {
            continue;
        };
        let item = String::from_utf8_lossy(field).into_owned();
        read.increment();
        tracing::trace!(item = %item, "read item");
        if urls.blocking_send(item).is_err() {
            tracing::info!("url channel closed; csv reader stopping");
            return;
        }
    }
    tracing::debug!("csv reader reached end of file");
}
