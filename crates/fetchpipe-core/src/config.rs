use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SetupError;
use crate::pipeline::PipelineOptions;

/// Pipeline tuning loaded from `~/.config/fetchpipe/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of fetches in flight at once (size of the token pool).
    pub max_parallel: usize,
    /// Payloads the sink buffers before `push_for_write` starts blocking workers.
    pub sink_buffer: usize,
    /// Seconds between periodic stats log lines.
    pub stats_interval_secs: u64,
    /// Seconds the completion handle stays alive after completion fires.
    pub grace_period_secs: u64,
    /// TCP/TLS connect timeout per fetch, in seconds.
    pub connect_timeout_secs: u64,
    /// Overall timeout per fetch (connect + transfer), in seconds.
    pub request_timeout_secs: u64,
    /// Extension for written payload files, without the dot.
    pub file_extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 50,
            sink_buffer: 100,
            stats_interval_secs: 5,
            grace_period_secs: 2,
            connect_timeout_secs: 15,
            request_timeout_secs: 120,
            file_extension: "txt".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Rejects values that would stall or break the pipeline.
    pub fn validate(&self) -> Result<(), SetupError> {
        PipelineOptions::from(self).validate()
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchpipe")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PipelineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PipelineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}

/// Load configuration from an explicit file. Missing keys take their defaults.
pub fn load_from_path(path: &Path) -> Result<PipelineConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: PipelineConfig = toml::from_str(&data)
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}
