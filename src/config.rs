//! Adapter configuration.
//!
//! Layered with the `config` crate: built-in defaults, the global
//! `config.toml`, an optional explicit file and finally `CLOUDFS__*`
//! environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub revision: RevisionConfig,

    #[serde(default)]
    pub hydration: HydrationConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Minimum age of the last write before a file may be read
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationConfig {
    /// Bytes copied between two progress reports
    #[serde(default = "default_progress_granularity")]
    pub progress_granularity_bytes: u64,

    /// Copy buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            progress_granularity_bytes: default_progress_granularity(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_progress_granularity() -> u64 {
    1024 * 1024
}

fn default_buffer_size() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Interval between two pulls of the event sources
    #[serde(default = "default_pull_interval_ms")]
    pub pull_interval_ms: u64,

    /// Path fragments whose events are dropped at the source
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            pull_interval_ms: default_pull_interval_ms(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

fn default_pull_interval_ms() -> u64 {
    500
}

fn default_ignore_patterns() -> Vec<String> {
    vec![".git".to_string(), "~$".to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Link store location; None means the platform data directory
    #[serde(default)]
    pub link_store_path: Option<PathBuf>,
}
