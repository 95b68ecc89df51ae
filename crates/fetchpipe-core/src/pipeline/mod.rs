//! Lifecycle coordinator: wires source → pool → sink and signals completion.
//!
//! States move strictly forward: `Idle → Running → Draining → Finished`.
//! - `Idle`: options validated, store opened, sink and pool started, source opened.
//!   Any failure here goes straight to `Finished` with the error recorded.
//! - `Running`: the source feeds the pool; the stats reporter logs periodically.
//! - `Draining`: the pool has drained. The source is closed (errors are only
//!   logged) and the sink is flushed.
//! - `Finished`: the outcome is published and the completion signal fires, once.
//!
//! The completion writer is kept for a short grace period after firing so
//! late observers can still read final state before it is released.

mod reporter;


use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::completion::{Completion, CompletionWatcher};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SetupError};
use crate::fetch::{CurlFetcher, CurlOptions, Fetcher};
use crate::pool::{FetchPool, PoolOptions};
use crate::sink::{DirStore, PayloadStore, PersistenceSink};
use crate::source::{CsvSource, ItemSource};
use crate::stats::{PoolStatsSnapshot, SinkStatsSnapshot, StatsRegistry};

use self::reporter::spawn_stats_reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Finished,
}

/// Runtime knobs for one pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub pool: PoolOptions,
    pub sink_buffer: usize,
    pub stats_interval: Duration,
    pub grace_period: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            pool: PoolOptions {
                max_parallel: cfg.max_parallel,
                ..PoolOptions::default()
            },
            sink_buffer: cfg.sink_buffer,
            stats_interval: cfg.stats_interval(),
            grace_period: cfg.grace_period(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.pool.max_parallel == 0 {
            return Err(SetupError::InvalidConfig(
                "max_parallel must be at least 1".into(),
            ));
        }
        if self.sink_buffer == 0 {
            return Err(SetupError::InvalidConfig(
                "sink_buffer must be at least 1".into(),
            ));
        }
        if self.stats_interval.is_zero() {
            return Err(SetupError::InvalidConfig(
                "stats_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Live view of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub state: PipelineState,
    pub items_read: u64,
    pub pool: PoolStatsSnapshot,
    pub sink: SinkStatsSnapshot,
}

/// Final totals of a run that got past setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub items_read: u64,
    pub pool: PoolStatsSnapshot,
    pub sink: SinkStatsSnapshot,
    /// True if the run was cut short by cancellation.
    pub cancelled: bool,
}

type Outcome = Result<PipelineReport, PipelineError>;

/// Handle to a launched pipeline.
pub struct Pipeline {
    state: watch::Receiver<PipelineState>,
    completion: CompletionWatcher,
    registry: Arc<StatsRegistry>,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<Outcome>,
}

impl Pipeline {
    /// Starts a pipeline in the background and returns immediately.
    ///
    /// `open_store` and `open_source` run during setup; an error from either
    /// finishes the pipeline without it ever running. `open_source` receives
    /// the pool's URL sender and must drop it (directly or by finishing its
    /// producer) to end the stream.
    pub fn launch<S, G, F>(
        opts: PipelineOptions,
        fetcher: Arc<dyn Fetcher>,
        open_store: G,
        open_source: F,
    ) -> Self
    where
        S: ItemSource,
        G: FnOnce() -> Result<Arc<dyn PayloadStore>, SetupError> + Send + 'static,
        F: FnOnce(mpsc::Sender<String>, CancellationToken) -> Result<S, SetupError>
            + Send
            + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (completion, watcher) = Completion::channel();
        let registry = Arc::new(StatsRegistry::new());
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let coordinator = Coordinator {
            opts,
            cancel: cancel.clone(),
            state: state_tx,
            registry: Arc::clone(&registry),
        };
        let done = watcher.clone();
        tokio::spawn(async move {
            let outcome = coordinator
                .run(fetcher, open_store, open_source, done)
                .await;
            if let Err(e) = &outcome {
                tracing::error!(error = %e, "pipeline setup failed");
            }
            coordinator.state.send_replace(PipelineState::Finished);
            let _ = outcome_tx.send(outcome);
            completion.fire();

            tokio::time::sleep(coordinator.opts.grace_period).await;
            drop(completion);
            tracing::debug!("completion handle released");
        });

        Self {
            state: state_rx,
            completion: watcher,
            registry,
            cancel,
            outcome: outcome_rx,
        }
    }

    /// Launches the default stack: curl fetcher, CSV file source, directory store.
    pub fn launch_csv(cfg: &PipelineConfig, csv_file: PathBuf, out_dir: PathBuf) -> Self {
        let fetcher: Arc<dyn Fetcher> = Arc::new(CurlFetcher::new(CurlOptions::from(cfg)));
        let extension = cfg.file_extension.clone();
        Self::launch(
            PipelineOptions::from(cfg),
            fetcher,
            move || {
                let store: Arc<dyn PayloadStore> = Arc::new(DirStore::new(out_dir, &extension)?);
                Ok(store)
            },
            move |urls, cancel| CsvSource::open(&csv_file, urls, cancel),
        )
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// The externally observable completion signal.
    pub fn completion(&self) -> CompletionWatcher {
        self.completion.clone()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            state: self.state(),
            items_read: self.registry.items_read(),
            pool: self.registry.pool(),
            sink: self.registry.sink(),
        }
    }

    /// Stops admitting new fetches. In-flight fetches finish; buffered
    /// payloads are dropped. Safe to call any number of times, before or
    /// after completion.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() && self.state() != PipelineState::Finished {
            tracing::info!("pipeline cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Waits for the pipeline to finish and returns its outcome.
    pub async fn wait(self) -> Result<PipelineReport, PipelineError> {
        self.outcome
            .await
            .unwrap_or(Err(PipelineError::CoordinatorLost))
    }
}

struct Coordinator {
    opts: PipelineOptions,
    cancel: CancellationToken,
    state: watch::Sender<PipelineState>,
    registry: Arc<StatsRegistry>,
}

impl Coordinator {
    async fn run<S, G, F>(
        &self,
        fetcher: Arc<dyn Fetcher>,
        open_store: G,
        open_source: F,
        done: CompletionWatcher,
    ) -> Outcome
    where
        S: ItemSource,
        G: FnOnce() -> Result<Arc<dyn PayloadStore>, SetupError>,
        F: FnOnce(mpsc::Sender<String>, CancellationToken) -> Result<S, SetupError>,
    {
        self.opts.validate()?;
        let store = open_store()?;

        let sink = PersistenceSink::start(store, self.opts.sink_buffer, self.cancel.clone());
        let mut pool = FetchPool::start(fetcher, sink.handle(), self.opts.pool, self.cancel.clone());
        let opened = pool
            .take_url_sender()
            .ok_or_else(|| SetupError::SourceUnavailable("url channel already taken".into()))
            .and_then(|urls| open_source(urls, self.cancel.clone()));
        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                // No items were ever sent: the pool drains at once.
                pool.drained().wait().await;
                drop(pool);
                sink.close().await;
                return Err(e.into());
            }
        };

        self.registry.attach_source(source.read_counter());
        self.registry.attach_pool(pool.stats_handle());
        self.registry.attach_sink(sink.stats_handle());
        self.state.send_replace(PipelineState::Running);
        tracing::info!(
            max_parallel = pool.max_parallel(),
            sink_buffer = self.opts.sink_buffer,
            "pipeline running"
        );
        let _reporter = spawn_stats_reporter(
            Arc::clone(&self.registry),
            self.state.subscribe(),
            self.opts.stats_interval,
            done,
            self.cancel.clone(),
        );

        let mut drained = pool.drained();
        tokio::select! {
            _ = drained.wait() => {}
            _ = self.cancel.cancelled() => {
                tracing::info!("cancelled; waiting for in-flight fetches to finish");
                drained.wait().await;
            }
        }
        self.state.send_replace(PipelineState::Draining);

        let items_read = source.items_read();
        if let Err(e) = source.close().await {
            tracing::warn!(error = %e, "failed to close item source");
        }
        let pool_stats = pool.stats();
        drop(pool);
        let sink_stats = sink.close().await;

        let report = PipelineReport {
            items_read,
            pool: pool_stats,
            sink: sink_stats,
            cancelled: self.cancel.is_cancelled(),
        };
        tracing::info!(
            items_read,
            succeeded = pool_stats.succeeded,
            failed = pool_stats.failed,
            written = sink_stats.written,
            write_failed = sink_stats.failed,
            dropped = sink_stats.dropped,
            cancelled = report.cancelled,
            "pipeline finished"
        );
        Ok(report)
    }
}
