//! Persistence sink: bounded ingress queue drained by a single writer task.
//!
//! Workers push payloads through a [`SinkHandle`]. A push completes as soon as
//! the buffer has room and waits otherwise, so a slow store throttles the
//! workers (and, through their held tokens, fetch admission). The consumer task
//! hands each payload to a [`PayloadStore`] on the blocking pool.
//!
//! Shutdown:
//! - [`PersistenceSink::close`] drops the owner's sender; once every worker
//!   handle is gone the consumer writes what is left and exits.
//! - On cancellation the consumer stops at once. Payloads still buffered, and
//!   pushes racing the cancellation, are dropped and counted in `dropped`.
//!   That is expected behavior on forced shutdown, not an error.

mod store;

pub use store::{DirStore, PayloadStore};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::stats::{SinkStats, SinkStatsSnapshot};

/// Owner side of the sink. Created once per pipeline.
pub struct PersistenceSink {
    tx: mpsc::Sender<Vec<u8>>,
    stats: Arc<SinkStats>,
    cancel: CancellationToken,
    consumer: JoinHandle<()>,
}

/// Producer side handed to fetch workers. Cheap to clone.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<Vec<u8>>,
    stats: Arc<SinkStats>,
    cancel: CancellationToken,
}

impl PersistenceSink {
    /// Spawns the consumer task. `capacity` is the number of payloads that can
    /// wait in the buffer before pushes block.
    pub fn start(
        store: Arc<dyn PayloadStore>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(SinkStats::new());
        let consumer = tokio::spawn(run_consumer(
            rx,
            store,
            Arc::clone(&stats),
            cancel.clone(),
        ));
        tracing::info!(capacity, "persistence sink started");
        Self {
            tx,
            stats,
            cancel,
            consumer,
        }
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            tx: self.tx.clone(),
            stats: Arc::clone(&self.stats),
            cancel: self.cancel.clone(),
        }
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<SinkStats> {
        Arc::clone(&self.stats)
    }

    /// Stops accepting payloads from this owner and waits for the consumer to
    /// finish. Outstanding [`SinkHandle`]s keep the consumer alive until they
    /// are dropped.
    pub async fn close(self) -> SinkStatsSnapshot {
        let Self {
            tx,
            stats,
            consumer,
            ..
        } = self;
        drop(tx);
        if let Err(e) = consumer.await {
            tracing::error!(error = %e, "sink consumer task failed");
        }
        stats.snapshot()
    }
}

impl SinkHandle {
    /// Queues `payload` for writing, waiting while the buffer is full.
    ///
    /// Returns `false` if the payload was dropped because the sink was
    /// cancelled or has already shut down.
    pub async fn push_for_write(&self, payload: Vec<u8>) -> bool {
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = self.tx.send(payload) => res.is_ok(),
        };
        if !sent {
            self.stats.record_dropped(1);
            tracing::debug!("sink closed; payload dropped");
        }
        sent
    }

    pub fn stats(&self) -> SinkStatsSnapshot {
        self.stats.snapshot()
    }
}

async fn run_consumer(
    mut rx: mpsc::Receiver<Vec<u8>>,
    store: Arc<dyn PayloadStore>,
    stats: Arc<SinkStats>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(payload) => payload,
                None => {
                    tracing::info!("persistence sink drained and stopped");
                    return;
                }
            },
        };
        write_one(&store, &stats, payload).await;
    }

    rx.close();
    let mut dropped = 0u64;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        stats.record_dropped(dropped);
    }
    tracing::info!(dropped, "persistence sink cancelled");
}

async fn write_one(store: &Arc<dyn PayloadStore>, stats: &SinkStats, payload: Vec<u8>) {
    stats.write_started();
    let bytes = payload.len();
    let store = Arc::clone(store);
    let res = tokio::task::spawn_blocking(move || store.store(&payload))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))
        .and_then(|r| r);
    match res {
        Ok(path) => {
            stats.write_finished(true);
            tracing::debug!(path = %path.display(), bytes, "saved payload");
        }
        Err(e) => {
            stats.write_finished(false);
            tracing::error!(error = %e, bytes, "failed to save payload");
        }
    }
}
