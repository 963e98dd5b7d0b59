//! Configuration for the ScaraLink daemon
//!
//! Loads configuration from a TOML file with the minimal parameters needed
//! to locate the controller and serve clients.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Serial link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Baud rate for the controller link
    pub baud_rate: u32,
    /// USB description substrings identifying the controller hardware
    pub signatures: Vec<String>,
    /// Fixed port path override (skips discovery when set)
    ///
    /// Examples: `/dev/ttyUSB0`, `/dev/ttyACM0`
    #[serde(default)]
    pub port: Option<String>,
}

/// Client server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for client connections
    ///
    /// Examples:
    /// - `0.0.0.0:9000` - Bind to all interfaces on port 9000
    /// - `127.0.0.1:9000` - Localhost only
    pub bind_address: String,
}

/// Link supervisor timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Delay before retrying after device absence or a link fault
    pub backoff_ms: u64,
    /// Delay after a successful open, letting the controller finish its
    /// boot sequence before stale input is drained
    pub settle_ms: u64,
    /// Poll interval while the link is open and idle
    pub idle_tick_ms: u64,
}

impl SupervisorConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            signatures: vec!["Arduino".to_string(), "CH340".to_string()],
            port: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 3000,
            settle_ms: 2000,
            idle_tick_ms: 50,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            network: NetworkConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Returns
    /// Parsed configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}
