//! One-shot completion events with any number of observers.
//!
//! Used twice: the pool's "workers drained" event and the pipeline's public
//! completion signal. A [`Completion`] fires at most once; watchers created
//! before or after the fire (and even after the writer is gone) all observe it.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Writer side. Owned by exactly one component.
#[derive(Debug)]
pub struct Completion {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

/// Observer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompletionWatcher {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn channel() -> (Self, CompletionWatcher) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                fired: AtomicBool::new(false),
                tx,
            },
            CompletionWatcher { rx },
        )
    }

    /// Fires the event. Returns `true` for the first call only; later calls
    /// are no-ops.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn watcher(&self) -> CompletionWatcher {
        CompletionWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl CompletionWatcher {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the event fires. Returns immediately if it already has.
    ///
    /// Returns `false` if the writer was dropped without ever firing.
    pub async fn wait(&mut self) -> bool {
        loop {
            if *self.rx.borrow_and_update() {
                return true;
            }
            if self.rx.changed().await.is_err() {
                return *self.rx.borrow();
            }
        }
    }
}
