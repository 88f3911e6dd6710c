//! Configuration management.

#![allow(dead_code)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use telemetry_core::{DEFAULT_PORT, DEFAULT_THROTTLE_MS};

use crate::server::ServerConfig;
use crate::sources::SourceSelection;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind, as an IP literal (e.g., "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Minimum interval between two real collections in milliseconds
    #[serde(default = "default_throttle")]
    pub throttle_ms: u32,

    /// Stop after this many milliseconds (0 = run until signalled)
    #[serde(default)]
    pub run_for_ms: u64,

    /// Metric sources to install
    #[serde(default)]
    pub source: SourceSelection,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_throttle() -> u32 {
    DEFAULT_THROTTLE_MS
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "Failed to read configuration file {}",
                path.as_ref().display()
            )
        })?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Returns the parameters consumed by the TCP server.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            throttle_ms: self.throttle_ms,
            run_for_ms: self.run_for_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            throttle_ms: default_throttle(),
            run_for_ms: 0,
            source: SourceSelection::default(),
        }
    }
}
