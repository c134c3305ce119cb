use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::types::{HumanDuration, OutputFormat, OutputMode};
use crate::validate;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of parallel dataflow workers.
    pub workers: usize,
    /// Capacity of every bounded channel (ingest, shuffle, results).
    pub channel_capacity: usize,
    /// Upper bound on a single blocked shuffle send before the run aborts.
    pub shuffle_timeout: HumanDuration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            channel_capacity: 1024,
            shuffle_timeout: HumanDuration::from(std::time::Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// When set, an event at time-point `t` implies watermark
    /// `t - max_delay - 1`.
    pub max_delay: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub path: Option<PathBuf>,
    pub format: OutputFormat,
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Resolved monitor configuration (`tempomon.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub runtime: RuntimeConfig,
    pub ingest: IngestConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Read, parse and validate a config file. Relative output and log paths
    /// are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config: MonitorConfig = content.parse()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(p) = self.output.path.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let Some(p) = self.logging.file.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

impl FromStr for MonitorConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: MonitorConfig = toml::from_str(toml_str)?;
        validate::validate(&config)?;
        Ok(config)
    }
}
