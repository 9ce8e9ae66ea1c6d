//! MCP Protocol
//!
//! The Model Context Protocol surface: JSON-RPC 2.0 messages, one per line,
//! over stdio.
//!
//! # Module Structure
//!
//! - `mod.rs` - Message types and the request handler
//! - `server` - The line-oriented serve loop

pub mod server;

pub use server::{serve, serve_until};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::service::QueryService;
use crate::tools::{call_tool, Tool, ToolCall, ToolError, ToolOutput};

/// Protocol revision this server speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Incoming message. A request without `id` is a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Json>,
    pub method: String,
    #[serde(default)]
    pub params: Json,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Json, result: Json) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Json, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Json,
}

/// Answers MCP requests against a [`QueryService`].
pub struct McpHandler {
    service: QueryService,
    server_name: String,
    instructions: Option<String>,
}

impl McpHandler {
    pub fn new(service: QueryService, server_name: impl Into<String>) -> Self {
        Self {
            service,
            server_name: server_name.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Build from config. A missing instructions file is logged and skipped.
    pub fn from_config(service: QueryService, config: &ServerConfig) -> Self {
        let handler = Self::new(service, config.name.clone());
        match config.instructions.as_deref() {
            Some(path) => match read_instructions(path) {
                Ok(text) => handler.with_instructions(text),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unable to read server instructions");
                    handler
                }
            },
            None => handler,
        }
    }

    pub fn service(&self) -> &QueryService {
        &self.service
    }

    /// Handle one raw line. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let value: Json = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "mcp_parse_error");
                return Some(Response::error(Json::Null, PARSE_ERROR, "Parse error"));
            }
        };
        let id = value.get("id").cloned().unwrap_or(Json::Null);
        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Some(Response::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            )),
        }
    }

    pub async fn handle(&self, request: Request) -> Option<Response> {
        debug!(method = %request.method, "mcp_request");
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "mcp_notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => Response::success(id, self.initialize_result()),
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(id, tools_list_result()),
            "tools/call" => self.call(id, request.params).await,
            other => Response::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Json {
        let mut result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = Json::String(instructions.clone());
        }
        result
    }

    async fn call(&self, id: Json, params: Json) -> Response {
        let params: CallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::error(id, INVALID_PARAMS, format!("Invalid params: {e}")),
        };
        let call = match ToolCall::parse(&params.name, &params.arguments) {
            Ok(call) => call,
            Err(e) => return Response::error(id, INVALID_PARAMS, e.to_string()),
        };

        info!(tool = call.tool().name(), "mcp_tool_call");
        let output = match call_tool(&self.service, call).await {
            Ok(output) => output,
            Err(ToolError::Connection(e)) => ToolOutput {
                text: e.to_string(),
                is_error: true,
            },
            Err(e) => return Response::error(id, INVALID_PARAMS, e.to_string()),
        };
        Response::success(
            id,
            json!({
                "content": [{"type": "text", "text": output.text}],
                "isError": output.is_error,
            }),
        )
    }
}

fn tools_list_result() -> Json {
    let tools: Vec<Json> = Tool::ALL
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "inputSchema": tool.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn read_instructions(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}
