//! Periodic stats log line.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::completion::CompletionWatcher;
use crate::stats::StatsRegistry;

use super::{PipelineSnapshot, PipelineState};

/// Logs a snapshot every `interval` until the pipeline completes or is cancelled.
/// The task yields the last snapshot it logged, if any.
pub(super) fn spawn_stats_reporter(
    registry: Arc<StatsRegistry>,
    state: watch::Receiver<PipelineState>,
    interval: Duration,
    mut done: CompletionWatcher,
    cancel: CancellationToken,
) -> JoinHandle<Option<PipelineSnapshot>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing has happened yet.
        ticker.tick().await;

        let mut last = None;
        loop {
            tokio::select! {
                _ = done.wait() => break,
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => last = Some(report(&registry, &state)),
            }
        }
        tracing::debug!("stats reporter stopped");
        last
    })
}

fn report(registry: &StatsRegistry, state: &watch::Receiver<PipelineState>) -> PipelineSnapshot {
    let snap = PipelineSnapshot {
        state: *state.borrow(),
        items_read: registry.items_read(),
        pool: registry.pool(),
        sink: registry.sink(),
    };
    tracing::info!(
        state = ?snap.state,
        items_read = snap.items_read,
        active = snap.pool.active,
        succeeded = snap.pool.succeeded,
        failed = snap.pool.failed,
        written = snap.sink.written,
        writing = snap.sink.writing,
        write_failed = snap.sink.failed,
        "pipeline stats"
    );
    snap
}
