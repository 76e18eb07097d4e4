//! Error types for the MCP crate.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Two collections tried to register the same tool name.
    #[error("tool already registered: {name}")]
    DuplicateTool { name: String },

    /// Invalid arguments for tool.
    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A message reached a session whose `init` has not completed.
    #[error("session is not initialized")]
    NotInitialized,

    /// `init` was invoked a second time on the same actor.
    #[error("session is already initialized")]
    AlreadyInitialized,

    /// Tool registration failed while activating a session.
    #[error("session initialization failed: {0}")]
    InitFailed(String),

    /// No more sessions can be created.
    #[error("session limit reached ({limit})")]
    SessionLimitReached { limit: usize },

    /// The session actor went away before answering.
    #[error("session {id} is unavailable")]
    SessionUnavailable { id: String },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl McpError {
    /// HTTP status a transport should use when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            McpError::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
            McpError::SessionLimitReached { .. } | McpError::SessionUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
