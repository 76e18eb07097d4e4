//! Tool handlers, tool collections and the registry that wires them into a
//! session's server.
//!
//! A [`ToolCollection`] is a named group of tools (for example the database
//! tools) that knows how to add itself to a [`ServerBuilder`]. The
//! [`ToolRegistry`] holds every collection the process serves and runs them
//! all, in order, when a session actor initializes.

use crate::error::McpError;
use crate::protocol::ToolContent;
use crate::server::ServerBuilder;
use async_trait::async_trait;
use pgmcp_core::Environment;
use serde_json::Value;
use std::sync::Arc;

/// Handler invoked for `tools/call`.
///
/// Errors are reported to the client as a tool result with `isError: true`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Vec<ToolContent>, McpError>;
}

/// A group of tools that registers itself on a session's server.
pub trait ToolCollection: Send + Sync {
    /// Collection name, used in logs.
    fn name(&self) -> &str;

    /// Add this collection's tools to `server`.
    ///
    /// `environment` is the process context; collections may consult it to
    /// decide which tools to expose.
    fn register(&self, server: &mut ServerBuilder, environment: &Environment)
    -> Result<(), McpError>;
}

/// Every tool collection served by this process.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    collections: Vec<Arc<dyn ToolCollection>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            collections: Vec::new(),
        }
    }

    /// Add a collection.
    pub fn with_collection(mut self, collection: Arc<dyn ToolCollection>) -> Self {
        self.collections.push(collection);
        self
    }

    /// Names of the configured collections.
    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name()).collect()
    }

    /// Register every collection's tools on `server`.
    ///
    /// Stops at the first failing collection; the caller is expected to
    /// discard the builder in that case.
    pub fn register(
        &self,
        server: &mut ServerBuilder,
        environment: &Environment,
    ) -> Result<(), McpError> {
        for collection in &self.collections {
            let before = server.len();
            collection.register(server, environment)?;
            tracing::debug!(
                collection = collection.name(),
                tools = server.len() - before,
                "Registered tool collection"
            );
        }
        Ok(())
    }
}
