//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::orderbook::checksum::DEFAULT_CHECKSUM_LEVELS;
use crate::orderbook::depth::{DepthOptions, Keying, Sequencing};
use crate::orderbook::pipeline::{PipelineConfig, DEFAULT_BUFFER_LIMIT};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Depth Engine ===
    /// Deltas held per key before the first snapshot arrives.
    #[serde(default = "default_buffer_limit")]
    pub depth_buffer_limit: usize,

    /// How long released nodes stay reusable, in milliseconds.
    #[serde(default = "default_retention_ms")]
    pub pool_retention_ms: u64,

    /// Verify snapshots and checksums for books created on first reference.
    #[serde(default)]
    pub verify_orderbook: bool,

    /// Levels per side covered by the book checksum.
    #[serde(default = "default_checksum_levels")]
    pub checksum_levels: usize,

    /// Require gapless update ids for books created on first reference.
    #[serde(default = "default_true")]
    pub strict_sequencing: bool,

    // === Replay ===
    /// JSON-lines file fed into the registry when the server starts.
    #[serde(default)]
    pub replay_path: Option<PathBuf>,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_buffer_limit() -> usize {
    DEFAULT_BUFFER_LIMIT
}

fn default_retention_ms() -> u64 {
    1_000
}

fn default_checksum_levels() -> usize {
    DEFAULT_CHECKSUM_LEVELS
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth_buffer_limit: default_buffer_limit(),
            pool_retention_ms: default_retention_ms(),
            verify_orderbook: false,
            checksum_levels: default_checksum_levels(),
            strict_sequencing: default_true(),
            replay_path: None,
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.depth_buffer_limit == 0 {
            return Err("DEPTH_BUFFER_LIMIT must be at least 1".to_string());
        }

        if self.pool_retention_ms == 0 {
            return Err("POOL_RETENTION_MS must be at least 1".to_string());
        }

        if self.checksum_levels == 0 {
            return Err("CHECKSUM_LEVELS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Node pool retention window.
    pub fn pool_retention(&self) -> Duration {
        Duration::from_millis(self.pool_retention_ms)
    }

    /// Options for books created on first reference.
    pub fn depth_options(&self) -> DepthOptions {
        DepthOptions {
            verify: self.verify_orderbook,
            sequencing: if self.strict_sequencing {
                Sequencing::Strict
            } else {
                Sequencing::Unsequenced
            },
            keying: Keying::Price,
            checksum_levels: self.checksum_levels,
        }
    }

    /// Pipeline tuning shared by every book.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            buffer_limit: self.depth_buffer_limit,
        }
    }
}
