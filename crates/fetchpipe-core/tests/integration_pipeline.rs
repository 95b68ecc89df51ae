//! Integration test: CSV file in, local HTTP server, payload files out.
//!
//! Runs the default curl/CSV/directory stack end to end and checks the
//! counters against what landed on disk.

mod common;

use common::http_server::{self, Route};
use fetchpipe_core::config::PipelineConfig;
use fetchpipe_core::error::{PipelineError, SetupError};
use fetchpipe_core::pipeline::{Pipeline, PipelineState};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        max_parallel: 4,
        sink_buffer: 8,
        stats_interval_secs: 1,
        grace_period_secs: 0,
        connect_timeout_secs: 5,
        request_timeout_secs: 10,
        ..PipelineConfig::default()
    }
}

fn write_csv(dir: &Path, rows: &[String]) -> std::path::PathBuf {
    let path = dir.join("urls.csv");
    let mut contents = String::from("url,note\n");
    for row in rows {
        contents.push_str(row);
        contents.push_str(",x\n");
    }
    fs::write(&path, contents).unwrap();
    path
}

fn written_payloads(dir: &Path) -> Vec<Vec<u8>> {
    let mut payloads: Vec<Vec<u8>> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .map(|p| fs::read(p).unwrap())
        .collect();
    payloads.sort();
    payloads
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn csv_to_files_end_to_end() {
    let server = http_server::start(vec![
        ("/a", Route::ok(b"alpha")),
        ("/b", Route::ok(b"bravo")),
        ("/c", Route::ok(b"charlie")),
        ("/broken", Route::status(500)),
    ]);
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = write_csv(
        input.path(),
        &[
            server.url("/a"),
            server.url("/b"),
            server.url("/c"),
            server.url("/broken"),
            server.url("/missing"),
        ],
    );

    let pipeline = Pipeline::launch_csv(&test_config(), csv, out.path().to_path_buf());
    let mut completion = pipeline.completion();
    let state = pipeline.watch_state();
    let report = pipeline.wait().await.expect("pipeline run");

    assert!(completion.wait().await);
    assert_eq!(*state.borrow(), PipelineState::Finished);
    assert_eq!(report.items_read, 5);
    assert_eq!(report.pool.dispatched, 5);
    assert_eq!(report.pool.succeeded, 3);
    assert_eq!(report.pool.failed, 2);
    assert_eq!(report.pool.active, 0);
    assert_eq!(report.sink.written, 3);
    assert_eq!(report.sink.failed, 0);
    assert!(!report.cancelled);
    assert_eq!(server.hits(), 5);

    assert_eq!(
        written_payloads(out.path()),
        vec![b"alpha".to_vec(), b"bravo".to_vec(), b"charlie".to_vec()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn schemeless_items_are_fetched_over_https() {
    // The server only speaks plain HTTP, so the https:// prefix makes the fetch fail.
    let server = http_server::start(vec![("/a", Route::ok(b"alpha"))]);
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let bare = server.url("/a").trim_start_matches("http://").to_string();
    let csv = write_csv(input.path(), &[bare, server.url("/a")]);

    let report = Pipeline::launch_csv(&test_config(), csv, out.path().to_path_buf())
        .wait()
        .await
        .expect("pipeline run");

    assert_eq!(report.items_read, 2);
    assert_eq!(report.pool.succeeded, 1);
    assert_eq!(report.pool.failed, 1);
    assert_eq!(written_payloads(out.path()), vec![b"alpha".to_vec()]);
}

#[tokio::test]
async fn missing_csv_is_setup_error() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let pipeline = Pipeline::launch_csv(
        &test_config(),
        input.path().join("nope.csv"),
        out.path().to_path_buf(),
    );
    let mut completion = pipeline.completion();

    let err = pipeline.wait().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Setup(SetupError::SourceOpen { .. })
    ));
    assert!(completion.wait().await);
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn missing_out_dir_is_setup_error() {
    let input = tempdir().unwrap();
    let csv = write_csv(input.path(), &["http://127.0.0.1:1/".to_string()]);
    let err = Pipeline::launch_csv(&test_config(), csv, input.path().join("absent"))
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Setup(SetupError::OutDirMissing(_))
    ));
}
