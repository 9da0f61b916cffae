//! Store configuration
//!
//! Loaded from a JSON file. Only `data_dir` is required; every other field
//! has a default. `validate()` runs on every load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;
use crate::store::DEFAULT_SEGMENT_SIZE;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: PathBuf,

    /// Slots per segment file (default 12,800)
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,

    /// Capacity of the nid → UUID cache; 0 disables it (default 10,000)
    #[serde(default = "default_reverse_cache_capacity")]
    pub reverse_cache_capacity: usize,

    /// Recent resolutions remembered per thread (default 32)
    #[serde(default = "default_thread_cache_capacity")]
    pub thread_cache_capacity: usize,

    /// Worker pool threads (default: available parallelism)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Write tasks allowed in flight at once (default 64)
    #[serde(default = "default_max_inflight_writes")]
    pub max_inflight_writes: usize,

    /// How long shutdown waits for the worker pool (default 30s)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Minimum logged severity (default "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_segment_size() -> usize {
    DEFAULT_SEGMENT_SIZE
}
fn default_reverse_cache_capacity() -> usize {
    10_000
}
fn default_thread_cache_capacity() -> usize {
    32
}
fn default_worker_threads() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}
fn default_max_inflight_writes() -> usize {
    64
}
fn default_shutdown_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Config {
    /// Default configuration rooted at `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            segment_size: default_segment_size(),
            reverse_cache_capacity: default_reverse_cache_capacity(),
            thread_cache_capacity: default_thread_cache_capacity(),
            worker_threads: default_worker_threads(),
            max_inflight_writes: default_max_inflight_writes(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            log_level: default_log_level(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.segment_size == 0 {
            return Err(ConfigError::Invalid("segment_size must be > 0".into()));
        }
        if self.segment_size > i32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "segment_size {} does not fit the segment header",
                self.segment_size
            )));
        }
        if self.thread_cache_capacity == 0 {
            return Err(ConfigError::Invalid("thread_cache_capacity must be > 0".into()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be > 0".into()));
        }
        if self.max_inflight_writes == 0 {
            return Err(ConfigError::Invalid("max_inflight_writes must be > 0".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// The configured minimum log severity.
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Invalid log_level: '{}'. Must be one of TRACE, INFO, WARN, ERROR, FATAL.",
                self.log_level
            ))
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_dir
    }
}
