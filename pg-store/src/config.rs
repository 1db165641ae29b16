//! Configuration loading for pg-store.
//!
//! Configuration is loaded from a TOML file (default: `store.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for pg-store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Request size limits.
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the store listener (default: 0.0.0.0:29500).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum concurrent client connections (default: 1024).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum key length in bytes (default: 1024).
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
    /// Maximum value size in bytes (default: 4MB).
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Serve /health and /metrics (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Bind address for HTTP server (default: 0.0.0.0:29501).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:29500".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_key_len() -> usize {
    1024
}

fn default_max_value_size() -> usize {
    4 * 1024 * 1024 // 4MB
}

fn default_http_bind() -> String {
    "0.0.0.0:29501".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_key_len: default_max_key_len(),
            max_value_size: default_max_value_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_http_bind(),
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

    /// Default configuration listening on `bind_address`.
    pub fn for_address(bind_address: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.server.bind_address = bind_address.into();
        config
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
