//! Server configuration.
//!
//! A single JSON file with optional sections; every field has a default
//! so an empty object (or no file at all) yields a runnable server.

use std::path::Path;

use banter_hub::{DEFAULT_FLUSH_ITEMS, DEFAULT_FLUSH_THRESHOLD, DEFAULT_SENDERS};
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or has the wrong shape.
    #[error("cannot parse config {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address.
    pub addr: String,
    /// Session cookie settings.
    pub session: SessionConfig,
    /// Hub tunables.
    pub hub: HubTunables,
    /// Static file routes served next to the chat endpoints.
    pub static_routes: Vec<StaticRoute>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            session: SessionConfig::default(),
            hub: HubTunables::default(),
            static_routes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: shown.clone(), source })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: shown, source })
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Cookie name.
    pub name: String,
    /// Session time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { name: "sid".to_string(), ttl_secs: 365 * 86_400 }
    }
}

/// Hub tunables, mirrored onto the hub at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubTunables {
    /// Dispatcher worker count.
    pub senders: usize,
    /// Timer flush period in seconds; zero disables the timer.
    pub flush_delay_secs: u64,
    /// Store batch size per flush slice.
    pub flush_items: usize,
    /// Buffer length that triggers an inline flush.
    pub flush_threshold: usize,
}

impl Default for HubTunables {
    fn default() -> Self {
        Self {
            senders: DEFAULT_SENDERS,
            flush_delay_secs: 30,
            flush_items: DEFAULT_FLUSH_ITEMS,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// One static file mount: URL prefix to filesystem directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticRoute {
    /// URL prefix, e.g. `/app`.
    pub url_path: String,
    /// Directory to serve.
    pub fs_path: String,
}
