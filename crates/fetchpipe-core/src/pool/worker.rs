//! One dispatched fetch: normalize, GET on the blocking pool, forward payload.

use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::sink::SinkHandle;
use crate::stats::PoolStats;
use crate::url_model::normalize_url;

/// Holds the concurrency token for one fetch and keeps `active` in step with it.
/// Dropping the guard (normal return, early return, panic unwind or task
/// abort) decrements `active` and releases the token.
pub(super) struct ActiveGuard {
    stats: Arc<PoolStats>,
    _permit: OwnedSemaphorePermit,
}

impl ActiveGuard {
    pub(super) fn new(stats: Arc<PoolStats>, permit: OwnedSemaphorePermit) -> Self {
        stats.fetch_started();
        Self {
            stats,
            _permit: permit,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.fetch_finished();
    }
}

/// Runs a single fetch to completion. Outcomes are counted and logged here;
/// nothing is returned because one item's failure never affects others.
pub(super) async fn fetch_and_push(
    item: String,
    fetcher: Arc<dyn Fetcher>,
    sink: SinkHandle,
    guard: ActiveGuard,
) {
    let stats = Arc::clone(&guard.stats);
    let target = normalize_url(&item);
    tracing::debug!(item = %item, url = %target, "fetch started");

    let url = target.clone();
    let result = tokio::task::spawn_blocking(move || fetcher.fetch(&url))
        .await
        .map_err(|e| FetchError::Worker {
            url: target.clone(),
            reason: e.to_string(),
        })
        .and_then(|r| r);

    match result {
        Ok(payload) => {
            stats.record_success();
            tracing::debug!(url = %target, bytes = payload.len(), "fetch succeeded");
            // The token is still held here: a full sink holds back new admissions.
            if !sink.push_for_write(payload).await {
                tracing::warn!(url = %target, "payload not persisted: sink shut down");
            }
        }
        Err(e) => {
            stats.record_failure();
            tracing::warn!(item = %item, error = %e, "fetch failed");
        }
    }
    drop(guard);
}
