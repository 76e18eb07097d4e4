//! `pgmcp tools` - list the tools every session registers (offline).

use anyhow::Result;
use pgmcp_adapter_pg::PgConnectionManager;
use pgmcp_core::{Environment, PgMcpConfig};
use pgmcp_mcp::{ServerBuilder, ServerInfo, ToolDefinition};
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_config, tool_registry};

/// Print tool names and descriptions; with `verbose`, input schemas too.
pub fn list(config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let tools = registered_tools(config)?;

    println!("\nAvailable Tools ({}):", tools.len());
    for tool in &tools {
        let mode = match &tool.annotations {
            Some(a) if a.read_only_hint == Some(true) => "read-only",
            Some(a) if a.destructive_hint == Some(true) => "writes",
            _ => "other",
        };
        println!("   • {} ({})", tool.name, mode);
        if let Some(desc) = &tool.description {
            println!("     {}", desc);
        }
        if verbose {
            let schema = serde_json::to_string_pretty(&tool.input_schema)?;
            for line in schema.lines() {
                println!("       {}", line);
            }
        }
    }
    println!();
    Ok(())
}

/// Run registration exactly as a session would and return the definitions.
fn registered_tools(config: PgMcpConfig) -> Result<Vec<ToolDefinition>> {
    let connections = Arc::new(PgConnectionManager::new(config.upstream.clone()));
    let info = ServerInfo::new(config.server.name.clone(), config.server.version.clone());
    let environment = Environment::new(config);

    let mut builder = ServerBuilder::new(info);
    tool_registry(connections).register(&mut builder, &environment)?;
    Ok(builder.build().tool_definitions())
}
