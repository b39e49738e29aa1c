//! Configuration loading for kachaka-mock.
//!
//! Configuration is loaded from a TOML file (default: `kachaka-mock.toml`).
//! Every section and field is optional.

use kachaka_core::CursorSource;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for kachaka-mock.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Cursor generation.
    #[serde(default)]
    pub cursor: CursorConfig,
    /// Initial resource values.
    #[serde(default)]
    pub seed: SeedConfig,
    /// Command simulation.
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0:26400).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Cursor generation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CursorConfig {
    /// `wall_clock` (default) or `sequence`.
    #[serde(default)]
    pub source: CursorSource,
}

/// Initial resource values.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Reported serial number (default: XXX12345).
    #[serde(default = "default_serial_number")]
    pub serial_number: String,
    /// Reported software version (default: 2.1.0).
    #[serde(default = "default_version")]
    pub version: String,
    /// Directory holding `pose.json`, `locations.json`, `shelves.json` and
    /// `png_map.json`. Missing files keep the built-in values.
    pub directory: Option<PathBuf>,
}

/// Command simulation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    /// How long a started command stays `Running`, in milliseconds
    /// (default: 100).
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

// Default value functions
fn default_bind_address() -> String {
    format!("0.0.0.0:{}", kachaka_types::DEFAULT_PORT)
}

fn default_serial_number() -> String {
    "XXX12345".to_string()
}

fn default_version() -> String {
    "2.1.0".to_string()
}

fn default_duration_ms() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            serial_number: default_serial_number(),
            version: default_version(),
            directory: None,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
