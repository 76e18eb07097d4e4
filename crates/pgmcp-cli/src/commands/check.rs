//! `pgmcp check` - validate configuration and optionally the database
//! connection.

use anyhow::{Context, Result};
use pgmcp_adapter_pg::PgConnectionManager;
use pgmcp_core::PgMcpConfig;
use pgmcp_mcp::ConnectionLifecycle;
use std::path::PathBuf;

use super::load_config;

pub async fn run(config_path: Option<PathBuf>, connect: bool) -> Result<()> {
    println!("Checking pgmcp configuration...");
    let config = load_config(config_path.as_deref())?;
    for line in summary(&config) {
        println!("  {}", line);
    }

    if connect {
        println!();
        println!("Connecting to {}...", config.upstream.redacted_connection_string());
        let manager = PgConnectionManager::new(config.upstream.clone());
        let pool = manager.acquire().await.context("Database connection failed")?;
        let version: String = sqlx::query_scalar("select version()")
            .fetch_one(&pool)
            .await
            .context("Failed to query server version")?;
        println!("  ✓ {}", version);
        manager.close_connections().await?;
    }

    println!();
    println!("✓ Configuration is valid");
    Ok(())
}

fn summary(config: &PgMcpConfig) -> Vec<String> {
    let mut lines = vec![
        format!("server:       {} {}", config.server.name, config.server.version),
        format!("listen:       {}{}", config.mcp.bind_addr(), config.mcp.normalized_base_path()),
        format!("idle timeout: {}s", config.mcp.session_idle_timeout_seconds),
        format!("max sessions: {}", config.mcp.max_sessions),
        format!("upstream:     {}", config.upstream.redacted_connection_string()),
        format!("max rows:     {}", config.database.max_rows),
    ];
    if config.database.read_only {
        lines.push("writes:       disabled (read_only)".to_string());
    }
    if !config.database.blocked_operations.is_empty() {
        lines.push(format!(
            "blocked:      {}",
            config.database.blocked_operations.join(", ")
        ));
    }
    lines
}
