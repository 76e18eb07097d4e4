//! # pgmcp-mcp
//!
//! MCP (Model Context Protocol) session runtime for pgmcp.
//!
//! Every client session is served by its own actor. The actor builds an
//! isolated tool table when it first receives a message, answers JSON-RPC
//! requests one at a time, and releases the shared database connections
//! when it is evicted or sits idle too long.
//!
//! ## Architecture
//!
//! ```text
//! AI Agent
//!       │
//!       │ HTTP: /sse, /sse/message, /mcp
//!       ▼
//! ┌──────────────────┐
//! │  Transport router│  ← http_transport
//! └────────┬─────────┘
//!          │ session id
//!          ▼
//! ┌──────────────────┐
//! │  SessionHost     │  ← one actor per id, spawned lazily
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  SessionActor    │  1. init: ToolRegistry → McpServer
//! │                  │  2. handle: tools/list, tools/call
//! │                  │  3. cleanup: ConnectionLifecycle
//! └──────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```ignore
//! use pgmcp_mcp::{HttpServer, SessionHost, ToolRegistry, TransportState};
//!
//! let registry = ToolRegistry::new().with_collection(Arc::new(DatabaseTools::new(pool.clone())));
//! let host = SessionHost::new(environment, registry, pool);
//! let state = Arc::new(TransportState::new(host, "", Duration::from_secs(30)));
//! HttpServer::new("127.0.0.1:3000", state).run(shutdown_signal()).await?;
//! ```

pub mod connection;
pub mod error;
pub mod host;
pub mod http_transport;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;

pub use connection::{ConnectionError, ConnectionLifecycle};
pub use error::McpError;
pub use host::SessionHost;
pub use http_transport::{HttpServer, MCP_SESSION_ID_HEADER, TransportState, create_router};
pub use protocol::{
    CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ServerInfo,
    ToolAnnotations, ToolContent, ToolDefinition,
};
pub use server::{McpServer, ServerBuilder};
pub use session::{ActorContext, Lifecycle, SessionActor, SessionId};
pub use tools::{ToolCollection, ToolHandler, ToolRegistry};
