//! MCP protocol server.
//!
//! A [`ServerBuilder`] collects tool definitions and handlers while a session
//! initializes. [`ServerBuilder::build`] freezes them into an [`McpServer`],
//! whose tool table cannot change for the rest of the session.

use crate::error::McpError;
use crate::protocol::*;
use crate::tools::ToolHandler;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Mutable tool table used during registration.
pub struct ServerBuilder {
    info: ServerInfo,
    tools: BTreeMap<String, RegisteredTool>,
}

impl ServerBuilder {
    /// Create a builder for a server with the given identity.
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn tool(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<&mut Self, McpError> {
        if self.tools.contains_key(&definition.name) {
            return Err(McpError::DuplicateTool {
                name: definition.name,
            });
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
            },
        );
        Ok(self)
    }

    /// Names registered so far, sorted.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Number of tools registered so far.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Freeze the tool table.
    pub fn build(self) -> McpServer {
        McpServer {
            info: self.info,
            tools: self.tools,
        }
    }
}

/// A fully registered MCP server for one session.
pub struct McpServer {
    info: ServerInfo,
    tools: BTreeMap<String, RegisteredTool>,
}

impl McpServer {
    /// Server identity.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Registered tool definitions, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Handle a JSON-RPC message.
    ///
    /// Returns `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            _ => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "serverInfo": self.info,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ListToolsResponse {
            tools: self.tool_definitions(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        error_codes::INVALID_PARAMS,
                        format!("Invalid params: {}", e),
                    );
                }
            },
            None => return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing params"),
        };

        let Some(tool) = self.tools.get(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Tool not found: {}", params.name),
            );
        };

        let result = match tool.handler.call(params.arguments).await {
            Ok(content) => CallToolResult::success(content),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Tool call failed");
                CallToolResult::failure(e.to_string())
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}
