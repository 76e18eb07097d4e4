//! CLI command implementations for pgmcp.

pub mod check;
pub mod serve;
pub mod tools;

use anyhow::{Context, Result};
use pgmcp_adapter_pg::{DatabaseTools, PgConnectionManager};
use pgmcp_core::PgMcpConfig;
use pgmcp_mcp::ToolRegistry;
use std::path::Path;
use std::sync::Arc;

/// Load configuration from `path`, or from `pgmcp.yaml` in the working
/// directory when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<PgMcpConfig> {
    PgMcpConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration".to_string(),
    })
}

/// Every tool collection served by pgmcp.
pub fn tool_registry(connections: Arc<PgConnectionManager>) -> ToolRegistry {
    ToolRegistry::new().with_collection(Arc::new(DatabaseTools::new(connections)))
}
