//! vcmp-player configuration
//!
//! Bootstrap settings loaded from TOML. Every field has a built-in
//! default, so a missing file (or a file naming only a few keys) is valid.
//! Per-chat runtime settings live in the database, not here.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Player configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server port
    pub port: u16,

    /// SQLite database file, relative to the root folder unless absolute
    pub database_file: PathBuf,

    /// Media cache directory, relative to the root folder unless absolute
    pub download_dir: PathBuf,

    /// Downloader program invoked on a cache miss
    pub downloader: String,

    /// Prefix joined with a track id to form the downloader's source URL
    pub source_url_prefix: String,

    /// Upper bound for one download
    pub resolve_timeout_secs: u64,

    /// Longest track accepted by the `play` endpoint
    pub duration_limit_secs: u64,

    /// Number of transport clients (assistants)
    pub assistants: usize,

    /// Capacity of the event broadcast channel
    pub event_buffer: usize,

    /// Latency reported by the loopback transport
    pub loopback_latency_ms: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5750,
            database_file: PathBuf::from("vcmp.db"),
            download_dir: PathBuf::from("downloads"),
            downloader: "yt-dlp".to_string(),
            source_url_prefix: "https://www.youtube.com/watch?v=".to_string(),
            resolve_timeout_secs: 300,
            duration_limit_secs: 3600,
            assistants: 1,
            event_buffer: 100,
            loopback_latency_ms: 0.0,
        }
    }
}

impl Config {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Anchor relative paths at the root folder
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.database_file.is_relative() {
            self.database_file = root.join(&self.database_file);
        }
        if self.download_dir.is_relative() {
            self.download_dir = root.join(&self.download_dir);
        }
        self
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Sanity checks the TOML parser cannot express
    pub fn validate(&self) -> Result<()> {
        if self.assistants == 0 {
            return Err(Error::Config("assistants must be at least 1".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be at least 1".to_string()));
        }
        if self.downloader.trim().is_empty() {
            return Err(Error::Config("downloader must not be empty".to_string()));
        }
        Ok(())
    }
}
