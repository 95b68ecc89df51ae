//! Live counters shared between workers and the stats reporter.
//!
//! Writers only do relaxed atomic adds, readers only loads, so reading a
//! snapshot never blocks a worker. Snapshots are plain values; the individual
//! fields are each exact but are not read as one atomic unit.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Items read by an item source. Cloned handles share one counter.
#[derive(Debug, Clone, Default)]
pub struct ReadCounter(Arc<AtomicU64>);

impl ReadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fetch pool counters.
#[derive(Debug, Default)]
pub struct PoolStats {
    active: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dispatched: AtomicU64,
}

/// Point-in-time view of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatsSnapshot {
    /// Fetches currently holding a concurrency token.
    pub active: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Items admitted past the token pool (total items seen by workers).
    pub dispatched: u64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            active: self.active.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}

impl PoolStatsSnapshot {
    /// Fetches that reached a terminal outcome.
    pub fn resolved(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Persistence sink counters.
#[derive(Debug, Default)]
pub struct SinkStats {
    written: AtomicU64,
    writing: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time view of [`SinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStatsSnapshot {
    pub written: u64,
    /// Payloads currently being handed to the store.
    pub writing: u64,
    pub failed: u64,
    /// Payloads discarded unwritten because of cancellation.
    pub dropped: u64,
}

impl SinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write_started(&self) {
        self.writing.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_finished(&self, ok: bool) {
        self.writing.fetch_sub(1, Ordering::Relaxed);
        if ok {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            written: self.written.load(Ordering::Relaxed),
            writing: self.writing.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Where the stats reporter finds every component's counters.
///
/// Components are attached once, as the pipeline sets them up; anything not
/// attached yet reads as zero.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    source: OnceLock<ReadCounter>,
    pool: OnceLock<Arc<PoolStats>>,
    sink: OnceLock<Arc<SinkStats>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_source(&self, counter: ReadCounter) {
        let _ = self.source.set(counter);
    }

    pub fn attach_pool(&self, stats: Arc<PoolStats>) {
        let _ = self.pool.set(stats);
    }

    pub fn attach_sink(&self, stats: Arc<SinkStats>) {
        let _ = self.sink.set(stats);
    }

    pub fn items_read(&self) -> u64 {
        self.source.get().map(ReadCounter::get).unwrap_or(0)
    }

    pub fn pool(&self) -> PoolStatsSnapshot {
        self.pool.get().map(|s| s.snapshot()).unwrap_or_default()
    }

    pub fn sink(&self) -> SinkStatsSnapshot {
        self.sink.get().map(|s| s.snapshot()).unwrap_or_default()
    }
}
