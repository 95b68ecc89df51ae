//! `fetchpipe --csv-file … --out-dir …` – run one pipeline to completion.

use anyhow::Result;
use fetchpipe_core::config::PipelineConfig;
use fetchpipe_core::pipeline::{Pipeline, PipelineReport};
use std::future::Future;
use std::io;
use std::path::PathBuf;

/// Exit status after a second Ctrl-C (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug)]
pub(super) enum RunOutcome {
    Finished(PipelineReport),
    /// Interrupted twice: in-flight fetches were left running.
    Abandoned,
}

/// Runs the pipeline until its completion signal fires. The first Ctrl-C
/// cancels it (in-flight fetches finish, the run reports normally); a second
/// one exits immediately.
pub async fn run_pipeline(
    cfg: &PipelineConfig,
    csv_file: PathBuf,
    out_dir: PathBuf,
) -> Result<PipelineReport> {
    tracing::info!(
        csv = %csv_file.display(),
        out = %out_dir.display(),
        max_parallel = cfg.max_parallel,
        "starting pipeline"
    );
    let pipeline = Pipeline::launch_csv(cfg, csv_file, out_dir);

    match drive(pipeline, tokio::signal::ctrl_c).await? {
        RunOutcome::Finished(report) => Ok(report),
        RunOutcome::Abandoned => {
            tracing::warn!("second interrupt; exiting without draining");
            eprintln!("interrupted again; exiting without waiting for in-flight fetches");
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}

/// Waits for `pipeline`, turning interrupts from `interrupt` into a cooperative
/// cancel (first) and abandonment (second). An interrupt source that errors is
/// ignored from then on.
pub(super) async fn drive<I, Fut>(pipeline: Pipeline, mut interrupt: I) -> Result<RunOutcome>
where
    I: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut completion = pipeline.completion();
    let interrupted = tokio::select! {
        _ = completion.wait() => false,
        res = interrupt() => match res {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to listen for Ctrl-C: {}", e);
                false
            }
        },
    };
    if !interrupted {
        return Ok(RunOutcome::Finished(pipeline.wait().await?));
    }

    eprintln!("interrupted; waiting for in-flight fetches to finish (Ctrl-C again to quit)");
    pipeline.cancel();
    tokio::select! {
        res = pipeline.wait() => Ok(RunOutcome::Finished(res?)),
        Ok(()) = interrupt() => Ok(RunOutcome::Abandoned),
    }
}
