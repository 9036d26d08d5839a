//! MCP Server implementation
//!
//! Transport-independent JSON-RPC message handling. The HTTP and stdio
//! transports hand raw message bodies to [`McpServer::handle_message`] and
//! write back whatever it returns.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::handlers::ToolDispatcher;
use crate::protocol::{
    negotiate_protocol_version, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::{get_tool_definitions, ToolDefinition};

const INSTRUCTIONS: &str = "Browse Helm chart repositories: search charts, list versions, \
    and read a chart's default values, dependencies and NOTES.txt without installing it.";

/// MCP Server for Helm chart repositories
///
/// Cheap to clone; clones share the dispatcher and its caches.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use helm_mcp::McpServer;
/// use helm_repo::{ClientOptions, HelmClient};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HelmClient::new(ClientOptions::default())?;
/// let server = McpServer::new(Arc::new(client));
/// let reply = server
///     .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
///     .await;
/// assert!(reply.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct McpServer {
    dispatcher: ToolDispatcher,
    tools: Arc<Vec<ToolDefinition>>,
}

impl McpServer {
    pub fn new(service: Arc<dyn helm_repo::ChartService>) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(service),
            tools: Arc::new(get_tool_definitions()),
        }
    }

    /// Available tools
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Handle a raw JSON-RPC message, single or batch.
    ///
    /// Returns the serialized reply, or `None` when the message held only
    /// notifications.
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        let reply = match serde_json::from_str::<Value>(message) {
            Ok(value) => self.handle_value(value).await?,
            Err(e) => parse_error(&e),
        };
        match serde_json::to_string(&reply) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    /// Handle an already parsed message, single or batch.
    pub async fn handle_value(&self, message: Value) -> Option<Value> {
        match message {
            Value::Array(batch) if batch.is_empty() => Some(to_value(JsonRpcResponse::error(
                None,
                INVALID_REQUEST,
                "Invalid Request: empty batch",
            ))),
            Value::Array(batch) => {
                let pending = batch.into_iter().map(|m| self.handle_single(m));
                let replies = futures::future::join_all(pending).await;
                let replies: Vec<Value> = replies.into_iter().flatten().map(to_value).collect();
                (!replies.is_empty()).then_some(Value::Array(replies))
            }
            single => self.handle_single(single).await.map(to_value),
        }
    }

    async fn handle_single(&self, message: Value) -> Option<JsonRpcResponse> {
        let id = message.get("id").cloned();
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid Request: {e}"),
                ));
            }
        };
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        tracing::debug!(method = %request.method, id = ?request.id, "Received request");

        if request.is_notification() {
            match request.method.as_str() {
                "notifications/initialized" | "initialized" => {
                    tracing::info!("Client initialized")
                }
                method => tracing::debug!(method, "Ignoring notification"),
            }
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            method => JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let params: InitializeParams = serde_json::from_value(params).unwrap_or_default();
        let version = negotiate_protocol_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = %client.version,
                protocol = version,
                "Initializing session"
            );
        }

        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "helm-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        JsonRpcResponse::success(id, to_value(result))
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": to_value(self.tools.as_slice()) }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {e}"));
            }
        };

        match self.dispatcher.call(&params.name, params.arguments).await {
            Ok(result) => JsonRpcResponse::success(id, to_value(result)),
            Err(e) => {
                tracing::info!(tool = %params.name, error = %e, "Rejected tool call");
                JsonRpcResponse::error(id, e.rpc_code(), e.to_string())
            }
        }
    }
}

/// Whether a raw message (single or batch) contains an `initialize` request.
pub fn contains_initialize(message: &Value) -> bool {
    let is_initialize = |m: &Value| m.get("method").and_then(Value::as_str) == Some("initialize");
    match message {
        Value::Array(batch) => batch.iter().any(is_initialize),
        single => is_initialize(single),
    }
}

/// JSON-RPC reply for a body that is not JSON.
pub fn parse_error(err: &serde_json::Error) -> Value {
    to_value(JsonRpcResponse::error(
        None,
        PARSE_ERROR,
        format!("Parse error: {err}"),
    ))
}

fn to_value(value: impl serde::Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response");
        Value::Null
    })
}
