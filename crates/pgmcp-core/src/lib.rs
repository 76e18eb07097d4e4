//! # pgmcp-core
//!
//! Configuration types and the process-wide [`Environment`] shared by all
//! pgmcp crates.
//!
//! The environment is handed to every session actor when it is constructed
//! and passed unchanged to the tool registry. It is read-only from the
//! point of view of the MCP layer.

// Configuration types shared across all pgmcp crates
pub mod config;
pub mod environment;

pub use config::{
    ConfigError, ConnectionPoolConfig, DatabaseConfig, McpConfig, PgMcpConfig, ServerConfig,
    SslMode, UpstreamConfig,
};
pub use environment::{CallerIdentity, Environment};
