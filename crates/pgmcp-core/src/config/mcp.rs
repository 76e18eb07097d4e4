//! MCP server configuration.
//!
//! Both transports (event stream under `/sse`, stateless under `/mcp`) are
//! always served from the same listener; this section controls where that
//! listener binds and how long idle sessions are kept alive.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

/// Configuration for the MCP HTTP server and its session actors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// HTTP host to bind.
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP port to bind.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Prefix for all transport endpoints (e.g. "/v1"). Empty by default.
    #[serde(default)]
    pub base_path: String,

    /// Seconds a session may sit idle before its eviction alarm fires.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_seconds: u64,

    /// Upper bound on concurrently live sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keep_alive")]
    pub sse_keep_alive_seconds: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            base_path: String::new(),
            session_idle_timeout_seconds: default_idle_timeout(),
            max_sessions: default_max_sessions(),
            sse_keep_alive_seconds: default_keep_alive(),
        }
    }
}

impl McpConfig {
    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_seconds)
    }

    /// SSE keep-alive interval as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_seconds)
    }

    /// Base path normalised to either "" or "/segment" with no trailing slash.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        check_interval(
            "mcp.session_idle_timeout_seconds",
            self.session_idle_timeout_seconds,
        )?;
        check_interval("mcp.sse_keep_alive_seconds", self.sse_keep_alive_seconds)?;
        if self.max_sessions == 0 {
            return Err(ConfigError::Validation {
                message: "mcp.max_sessions must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Longest accepted idle timeout or keep-alive interval (one day).
pub const MAX_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

fn check_interval(field: &str, seconds: u64) -> Result<(), ConfigError> {
    if seconds == 0 || seconds > MAX_INTERVAL_SECONDS {
        return Err(ConfigError::Validation {
            message: format!(
                "{} must be between 1 and {} seconds, got {}",
                field, MAX_INTERVAL_SECONDS, seconds
            ),
        });
    }
    Ok(())
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_sessions() -> usize {
    1024
}

fn default_keep_alive() -> u64 {
    30
}
