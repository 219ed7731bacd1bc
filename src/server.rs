//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 over stdio according to the MCP protocol specification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{rpc_codes, McpError, Result};
use crate::resources;
use crate::session::McpSession;
use crate::tools::ToolRegistry;

/// MCP protocol version we support.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information.
const SERVER_NAME: &str = "sqlchat-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 request. A request without an id is a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// MCP server.
pub struct McpServer {
    session: McpSession,
    registry: ToolRegistry,
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server with the given session.
    pub fn new(session: McpSession) -> Self {
        Self {
            session,
            registry: ToolRegistry::new(),
            initialized: false,
        }
    }

    /// The session backing this server.
    pub fn session(&self) -> &McpSession {
        &self.session
    }

    /// Whether a client has sent `initialize`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server, reading from stdin and writing to stdout, until stdin closes.
    pub async fn run(&mut self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Requests are handled one at a time, in arrival order.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                tracing::info!("Client closed the connection");
                break;
            }

            let Some(response) = self.handle_line(line.trim()).await else {
                continue;
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        Ok(())
    }

    /// Handle one line of input. Blank lines and notifications produce no response.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable request");
                Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }

        if request.id.is_none() {
            tracing::debug!(method = %request.method, "Notification received");
            if request.method == "notifications/initialized" || request.method == "initialized" {
                self.initialized = true;
            }
            return None;
        }

        tracing::debug!(method = %request.method, "Request received");
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request).await,
            "resources/list" => JsonRpcResponse::success(
                request.id,
                serde_json::json!({ "resources": resources::resources() }),
            ),
            "resources/templates/list" => JsonRpcResponse::success(
                request.id,
                serde_json::json!({ "resourceTemplates": resources::templates() }),
            ),
            "resources/read" => self.handle_resources_read(request).await,
            _ => JsonRpcResponse::error(
                request.id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Handle the initialize request.
    fn handle_initialize(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.initialized = true;
        tracing::info!("Client initialized");

        JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id,
            serde_json::json!({ "tools": self.registry.tools() }),
        )
    }

    /// Handle the tools/call request.
    async fn handle_tools_call(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params = match &request.params {
            Some(JsonValue::Object(obj)) => obj,
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing params object".to_string(),
                )
            }
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing 'name' in params".to_string(),
                )
            }
        };

        let arguments = match params.get("arguments") {
            Some(JsonValue::Object(obj)) => obj.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "'arguments' must be an object".to_string(),
                )
            }
        };

        match self.registry.dispatch(&self.session, &name, arguments).await {
            Ok(result) => {
                if result.is_error {
                    tracing::warn!(tool = %name, "Tool reported an error");
                }
                JsonRpcResponse::success(request.id, result.to_json())
            }
            Err(err) => {
                tracing::warn!(tool = %name, error = %err, "Tool call rejected");
                JsonRpcResponse::from_error(request.id, err)
            }
        }
    }

    /// Handle the resources/read request.
    async fn handle_resources_read(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let uri = match request
            .params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(|v| v.as_str())
        {
            Some(uri) => uri.to_string(),
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing 'uri' in params".to_string(),
                )
            }
        };

        match resources::read(&self.session, &uri).await {
            Ok(contents) => {
                JsonRpcResponse::success(request.id, serde_json::json!({ "contents": contents }))
            }
            Err(err) => JsonRpcResponse::from_error(request.id, err),
        }
    }
}
