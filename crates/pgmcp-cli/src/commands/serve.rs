//! `pgmcp serve` - start the MCP HTTP server.
//!
//! Runs until Ctrl+C. On shutdown every open event stream is closed, every
//! session is evicted and the database pool is released.

use anyhow::{Context, Result};
use pgmcp_adapter_pg::PgConnectionManager;
use pgmcp_core::Environment;
use pgmcp_mcp::{ConnectionLifecycle, HttpServer, SessionHost, TransportState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{load_config, tool_registry};

/// Start the server.
///
/// `host` and `port` override the `mcp` section of the configuration.
pub async fn run(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(host) = host {
        config.mcp.host = host;
    }
    if let Some(port) = port {
        config.mcp.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let bind_addr = config.mcp.bind_addr();
    let base_path = config.mcp.normalized_base_path();
    let keep_alive = config.mcp.keep_alive();

    info!(
        name = %config.server.name,
        version = %config.server.version,
        upstream = %config.upstream.redacted_connection_string(),
        read_only = config.database.read_only,
        idle_timeout_seconds = config.mcp.session_idle_timeout_seconds,
        max_sessions = config.mcp.max_sessions,
        "Starting pgmcp"
    );

    let connections = Arc::new(PgConnectionManager::new(config.upstream.clone()));
    let registry = tool_registry(connections.clone());
    let host = SessionHost::new(Environment::new(config), registry, connections.clone());
    let state = Arc::new(TransportState::new(host, base_path.clone(), keep_alive));

    info!(
        sse = %format!("http://{}{}/sse", bind_addr, base_path),
        mcp = %format!("http://{}{}/mcp", bind_addr, base_path),
        "Endpoints"
    );

    HttpServer::new(bind_addr, state)
        .run(shutdown_signal())
        .await
        .context("MCP HTTP server failed")?;

    // Sessions already released the pool; this covers the no-session case.
    if let Err(e) = connections.close_connections().await {
        warn!(error = %e, "Error closing database pool");
    }
    info!("pgmcp stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
