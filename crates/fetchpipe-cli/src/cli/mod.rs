//! CLI for the fetchpipe URL fetcher.

mod run;

use anyhow::Result;
use clap::Parser;
use fetchpipe_core::config::{self, PipelineConfig};
use std::path::PathBuf;

use run::run_pipeline;

/// Fetch every URL listed in a CSV file and store each body as its own file.
#[derive(Debug, Parser)]
#[command(name = "fetchpipe")]
#[command(about = "fetchpipe: concurrent CSV-driven URL fetcher", long_about = None)]
pub struct Cli {
    /// CSV file with a header row; the first column of each record is fetched.
    #[arg(long, value_name = "PATH")]
    pub csv_file: PathBuf,

    /// Existing directory that receives one file per successful fetch.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Maximum number of fetches in flight (overrides `max_parallel` from the config).
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Read configuration from this TOML file instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = cli.resolve_config()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let report = run_pipeline(&cfg, cli.csv_file, cli.out_dir).await?;
        println!(
            "read {}  fetched {}  failed {}  written {}  write errors {}{}",
            report.items_read,
            report.pool.succeeded,
            report.pool.failed,
            report.sink.written,
            report.sink.failed,
            if report.cancelled { "  (interrupted)" } else { "" }
        );
        Ok(())
    }

    /// Config file (explicit or default) with command-line overrides applied.
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from_path(path)?,
            None => config::load_or_init()?,
        };
        if let Some(parallel) = self.parallel {
            cfg.max_parallel = parallel;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests;
