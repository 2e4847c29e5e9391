//! Configuration loading.
//!
//! The proxy consumes an already-validated route list; this module is the
//! thin I/O layer that produces it from a JSON file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::proxy::Endpoint;

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration consumed by `Proxy::new`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Forwarding routes, in order.
    pub routes: Vec<RouteConfig>,

    /// Seconds between usage reports; 0 disables monitoring.
    #[serde(default)]
    pub monitor_interval: u64,

    /// Log level used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One route descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    /// Endpoint to listen on.
    pub source: Endpoint,

    /// Destination endpoints; more than one enables round-robin balancing.
    pub destinations: Vec<Endpoint>,

    /// Maximum simultaneously active sessions for this route.
    #[serde(default)]
    pub max_sessions: usize,

    /// Transfer buffer size in bytes.
    #[serde(default)]
    pub buffer_size: usize,
}

impl Config {
    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|err| Error::Config(format!("cannot parse {}: {err}", path.display())))
    }

    /// Reject unusable values instead of silently defaulting: an omitted
    /// limit or buffer size is a configuration error, not unlimited mode.
    pub fn validate(&self) -> Result<()> {
        if self.routes.is_empty() {
            return Err(Error::Config("route list is empty".into()));
        }
        for (index, route) in self.routes.iter().enumerate() {
            if route.destinations.is_empty() {
                return Err(Error::Config(format!(
                    "route {index}: destinations are not configured"
                )));
            }
            if route.max_sessions == 0 {
                return Err(Error::Config(format!(
                    "route {index}: max_sessions is not configured"
                )));
            }
            if route.buffer_size == 0 {
                return Err(Error::Config(format!(
                    "route {index}: buffer_size is not configured"
                )));
            }
        }
        Ok(())
    }
}
