//! Configuration types for the pgmcp server.
//!
//! Configuration is loaded from a single YAML file (`pgmcp.yaml` by default).
//! Every section is optional; missing values fall back to the defaults
//! documented on each field.
//!
//! ```yaml
//! server:
//!   name: PostgreSQL Database MCP Server
//!   version: 1.0.0
//! mcp:
//!   host: 127.0.0.1
//!   port: 3000
//!   session_idle_timeout_seconds: 300
//! upstream:
//!   database_url_env: DATABASE_URL
//! database:
//!   read_only: false
//!   max_rows: 1000
//! ```

pub mod database;
pub mod mcp;
pub mod upstream;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use database::DatabaseConfig;
pub use mcp::McpConfig;
pub use upstream::{ConnectionPoolConfig, SslMode, UpstreamConfig, redact_url};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pgmcp.yaml";

/// Complete pgmcp configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgMcpConfig {
    /// Identity advertised by every session's protocol server.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP transport and session settings.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Upstream Postgres connection.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Database tool guardrails.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Name and version reported in the MCP `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

fn default_server_name() -> String {
    "PostgreSQL Database MCP Server".to_string()
}

fn default_server_version() -> String {
    "1.0.0".to_string()
}

impl PgMcpConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, or fall back to defaults.
    ///
    /// An explicitly given path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    tracing::debug!("No configuration file found, using defaults");
                    let config = Self::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "server.name must not be empty".to_string(),
            });
        }
        self.mcp.validate()?;
        self.database.validate()?;
        if let Some(pool) = &self.upstream.pool
            && pool.min_connections > pool.max_connections
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "upstream.pool.min_connections ({}) exceeds max_connections ({})",
                    pool.min_connections, pool.max_connections
                ),
            });
        }
        Ok(())
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// A value is out of range or inconsistent.
    #[error("configuration validation failed: {message}")]
    Validation { message: String },
}
