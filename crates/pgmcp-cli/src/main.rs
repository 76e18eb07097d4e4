use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "pgmcp",
    version,
    about = "MCP server exposing a PostgreSQL database to AI agents"
)]
struct Cli {
    /// Configuration file (defaults to ./pgmcp.yaml when present)
    #[arg(short, long, global = true, env = "PGMCP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the MCP HTTP server (/sse, /sse/message, /mcp)
    Serve {
        /// Address to bind, overrides mcp.host
        #[arg(long, env = "PGMCP_HOST")]
        host: Option<String>,

        /// Port to bind, overrides mcp.port
        #[arg(short, long, env = "PGMCP_PORT")]
        port: Option<u16>,
    },

    /// List the tools registered on every session
    Tools {
        /// Also print each tool's input schema
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },

    /// Validate the configuration
    Check {
        /// Also open a connection to the database
        #[arg(long, default_value_t = false)]
        connect: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve { host, port } => commands::serve::run(cli.config, host, port).await?,
        Command::Tools { verbose } => commands::tools::list(cli.config, verbose)?,
        Command::Check { connect } => commands::check::run(cli.config, connect).await?,
    }

    Ok(())
}
