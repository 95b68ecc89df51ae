use crate::cli::run::{drive, RunOutcome};
use fetchpipe_core::error::FetchError;
use fetchpipe_core::fetch::Fetcher;
use fetchpipe_core::pipeline::{Pipeline, PipelineOptions};
use fetchpipe_core::pool::PoolOptions;
use fetchpipe_core::sink::{DirStore, PayloadStore};
use fetchpipe_core::source::CsvSource;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Blocks every fetch until released; records that a fetch started.
struct GatedFetcher {
    started: Arc<AtomicBool>,
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl Fetcher for GatedFetcher {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        self.started.store(true, Ordering::SeqCst);
        let _ = self.gate.lock().unwrap().recv();
        Ok(b"body".to_vec())
    }
}

struct Harness {
    pipeline: Pipeline,
    started: Arc<AtomicBool>,
    release: std::sync::mpsc::Sender<()>,
    _input: tempfile::TempDir,
    _out: tempfile::TempDir,
}

fn launch_one_item() -> Harness {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let csv = input.path().join("urls.csv");
    std::fs::write(&csv, "url\nhttp://a.example/\n").unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let (release, gate) = std::sync::mpsc::channel();
    let fetcher: Arc<dyn Fetcher> = Arc::new(GatedFetcher {
        started: Arc::clone(&started),
        gate: Mutex::new(gate),
    });
    let opts = PipelineOptions {
        pool: PoolOptions {
            max_parallel: 1,
            intake_buffer: 1,
        },
        sink_buffer: 1,
        stats_interval: Duration::from_secs(60),
        grace_period: Duration::from_millis(10),
    };
    let out_dir = out.path().to_path_buf();
    let pipeline = Pipeline::launch(
        opts,
        fetcher,
        move || {
            let store: Arc<dyn PayloadStore> = Arc::new(DirStore::new(out_dir, "txt")?);
            Ok(store)
        },
        move |urls, cancel| CsvSource::open(&csv, urls, cancel),
    );
    Harness {
        pipeline,
        started,
        release,
        _input: input,
        _out: out,
    }
}

type InterruptFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// Interrupt source fed from a channel; counts interrupts delivered.
fn interrupts(
    rx: mpsc::UnboundedReceiver<()>,
    delivered: Arc<AtomicUsize>,
) -> impl FnMut() -> InterruptFuture {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    move || {
        let rx = Arc::clone(&rx);
        let delivered = Arc::clone(&delivered);
        Box::pin(async move {
            match rx.lock().await.recv().await {
                Some(()) => {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                None => Err(io::Error::other("interrupt source closed")),
            }
        })
    }
}

async fn wait_for(flag: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !flag() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_interrupt_abandons_in_flight_fetches() {
    let h = launch_one_item();
    let started = Arc::clone(&h.started);
    wait_for(|| started.load(Ordering::SeqCst)).await;

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(()).unwrap();
    tx.send(()).unwrap();
    let outcome = drive(h.pipeline, interrupts(rx, Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Abandoned));

    // Let the blocked fetch return so the runtime can shut down.
    let _ = h.release.send(());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_interrupt_drains_and_reports() {
    let h = launch_one_item();
    let started = Arc::clone(&h.started);
    wait_for(|| started.load(Ordering::SeqCst)).await;

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(()).unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));
    let run = tokio::spawn(drive(h.pipeline, interrupts(rx, Arc::clone(&delivered))));

    wait_for(|| delivered.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.release.send(()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("drain did not finish")
        .unwrap()
        .unwrap();
    match outcome {
        RunOutcome::Finished(report) => {
            assert!(report.cancelled);
            assert_eq!(report.pool.succeeded, 1);
            assert_eq!(report.pool.active, 0);
        }
        RunOutcome::Abandoned => panic!("a single interrupt must not abandon the run"),
    }
    drop(tx);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_interrupt_source_waits_for_completion() {
    let h = launch_one_item();
    h.release.send(()).unwrap();

    let (tx, rx) = mpsc::unbounded_channel::<()>();
    drop(tx);
    let outcome = drive(h.pipeline, interrupts(rx, Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();
    match outcome {
        RunOutcome::Finished(report) => {
            assert!(!report.cancelled);
            assert_eq!(report.pool.succeeded, 1);
            assert_eq!(report.sink.written, 1);
        }
        RunOutcome::Abandoned => panic!("no interrupt was delivered"),
    }
}
