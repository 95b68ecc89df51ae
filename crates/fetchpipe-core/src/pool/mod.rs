//! Fetch worker pool.
//!
//! A single intake task reads items from the URL channel. For each item it
//! waits for a token from a fixed-size semaphore, then spawns the fetch as its
//! own task and goes straight back to the channel. At most `max_parallel`
//! fetches therefore exist at any time, however fast items arrive.
//!
//! Intake stops when the channel closes or the cancellation token fires.
//! Cancellation is cooperative: fetches already dispatched run to completion
//! (in-flight HTTP calls are never aborted), only new admissions stop. Once
//! intake has stopped and every dispatched fetch has released its token, the
//! pool fires its "workers drained" signal.

mod worker;


use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::completion::{Completion, CompletionWatcher};
use crate::fetch::Fetcher;
use crate::sink::SinkHandle;
use crate::stats::{PoolStats, PoolStatsSnapshot};

use self::worker::{fetch_and_push, ActiveGuard};

/// Pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Token pool size: maximum fetches in flight.
    pub max_parallel: usize,
    /// Items the URL channel holds before the producer waits for intake.
    pub intake_buffer: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_parallel: 50,
            intake_buffer: 64,
        }
    }
}

/// Handle to a running pool.
pub struct FetchPool {
    urls: Option<mpsc::Sender<String>>,
    drained: CompletionWatcher,
    stats: Arc<PoolStats>,
    max_parallel: usize,
}

impl FetchPool {
    /// Spawns the intake task and returns immediately.
    pub fn start(
        fetcher: Arc<dyn Fetcher>,
        sink: SinkHandle,
        opts: PoolOptions,
        cancel: CancellationToken,
    ) -> Self {
        let max_parallel = opts.max_parallel.max(1);
        let (tx, rx) = mpsc::channel(opts.intake_buffer.max(1));
        let (drained, watcher) = Completion::channel();
        let stats = Arc::new(PoolStats::new());

        let intake = Intake {
            rx,
            fetcher,
            sink,
            tokens: Arc::new(Semaphore::new(max_parallel)),
            stats: Arc::clone(&stats),
            cancel,
        };
        tokio::spawn(async move {
            intake.run().await;
            drained.fire();
        });
        tracing::info!(max_parallel, "fetch pool started");

        Self {
            urls: Some(tx),
            drained: watcher,
            stats,
            max_parallel,
        }
    }

    /// The producer end of the URL channel. Can be taken once; dropping it
    /// (and any clones) closes the stream and lets the pool drain.
    pub fn take_url_sender(&mut self) -> Option<mpsc::Sender<String>> {
        self.urls.take()
    }

    /// Fires once intake has stopped and every dispatched fetch has finished.
    pub fn drained(&self) -> CompletionWatcher {
        self.drained.clone()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }
}

struct Intake {
    rx: mpsc::Receiver<String>,
    fetcher: Arc<dyn Fetcher>,
    sink: SinkHandle,
    tokens: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    cancel: CancellationToken,
}

impl Intake {
    async fn run(self) {
        let Intake {
            mut rx,
            fetcher,
            sink,
            tokens,
            stats,
            cancel,
        } = self;
        let mut tasks = JoinSet::new();

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("fetch pool intake cancelled");
                    break;
                }
                next = rx.recv() => match next {
                    Some(item) => item,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(item = %item, "cancelled while waiting for a token; item not dispatched");
                    break;
                }
                permit = Arc::clone(&tokens).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            stats.record_dispatch();
            let guard = ActiveGuard::new(Arc::clone(&stats), permit);
            tasks.spawn(fetch_and_push(
                item,
                Arc::clone(&fetcher),
                sink.clone(),
                guard,
            ));

            while let Some(res) = tasks.try_join_next() {
                log_worker_exit(res);
            }
        }

        // Close the stream so a producer blocked on a full channel gives up.
        drop(rx);
        drop(sink);

        while let Some(res) = tasks.join_next().await {
            log_worker_exit(res);
        }

        let snap = stats.snapshot();
        tracing::info!(
            dispatched = snap.dispatched,
            succeeded = snap.succeeded,
            failed = snap.failed,
            "fetch workers drained"
        );
    }
}

fn log_worker_exit(res: Result<(), JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "fetch worker task failed");
    }
}
