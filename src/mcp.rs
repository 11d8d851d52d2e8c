//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//! The five catalog tools are exposed as MCP tools with the argument schemas from
//! [`crate::tools::catalog`].
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dependencies**: Only `serde_json` and anyhow (no MCP-specific crates)
//! - **Protocol**: `initialize`, `tools/list`, `tools/call`
//!
//! Tool failures are reported as tool results with `isError: true` and an
//! [`ErrorEnvelope`] body; JSON-RPC errors are reserved for protocol problems.
//!
//! # Usage
//!
//! Start the MCP server with: `tabletalk mcp`
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "tabletalk": {
//!       "command": "tabletalk",
//!       "args": ["mcp"]
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::time::Instant;
use tracing::{debug, warn};

use crate::engine::ConnectionProvider;
use crate::output::{ErrorEnvelope, SuccessEnvelope};
use crate::tools::{catalog, ToolCall, ToolExecutor};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl TextContent {
    fn new(text: String) -> Self {
        Self { content_type: "text".to_string(), text }
    }
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    fn new(data: impl Serialize, is_error: bool) -> Result<Value> {
        let json_text = serde_json::to_string_pretty(&data)?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error };
        Ok(serde_json::to_value(result)?)
    }
}

/// Protocol failure mapped to a JSON-RPC error code
struct RpcFailure {
    code: i32,
    message: String,
}

impl From<anyhow::Error> for RpcFailure {
    fn from(e: anyhow::Error) -> Self {
        Self { code: -32603, message: e.to_string() }
    }
}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server over one tool executor
pub struct McpServer<P> {
    executor: ToolExecutor<P>,
    engine: String,
}

impl<P: ConnectionProvider> McpServer<P> {
    /// `engine` is reported in result envelopes
    pub fn new(executor: ToolExecutor<P>, engine: impl Into<String>) -> Self {
        Self { executor, engine: engine.into() }
    }

    /// Run the server loop until stdin closes
    ///
    /// Each request is a single line of JSON; each response is a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio communication fails.
    #[allow(clippy::future_not_send)]
    pub async fn serve(&self) -> Result<()> {
        let stdin = io::stdin();
        let reader = stdin.lock();
        let mut stdout = io::stdout();

        for line in reader.lines() {
            let line = line?;

            if let Some(response) = self.handle_line(&line).await {
                writeln!(stdout, "{response}")?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    /// Handle one line of input; `None` when no response is due
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) if request.id.is_none() && request.method.starts_with("notifications/") => {
                debug!(method = %request.method, "notification received");
                return None;
            }
            Ok(request) => self.handle_request(request).await,
            Err(e) => JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}")),
        };

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "could not serialize response");
                None
            }
        }
    }

    /// Routes the request to the appropriate handler based on the method name.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => handle_initialize().map_err(RpcFailure::from),
            "tools/list" => handle_list_tools().map_err(RpcFailure::from),
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(json!({})),
            other => Err(RpcFailure {
                code: METHOD_NOT_FOUND,
                message: format!("Unknown method: {other}"),
            }),
        };

        match result {
            Ok(value) => JsonRpcResponse::result(request.id, value),
            Err(failure) => JsonRpcResponse::error(request.id, failure.code, failure.message),
        }
    }

    /// Handle tools/call request
    async fn handle_call_tool(&self, params: Option<Value>) -> std::result::Result<Value, RpcFailure> {
        let invalid = |message: &str| RpcFailure { code: INVALID_PARAMS, message: message.to_string() };

        let params = params.ok_or_else(|| invalid("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| invalid("Missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let call = match ToolCall::from_invocation(name, &arguments) {
            Ok(call) => call,
            Err(e) => {
                return Ok(CallToolResult::new(ErrorEnvelope::from_error(&self.engine, name, &e), true)?);
            }
        };

        let start = Instant::now();
        let value = match self.executor.execute(&call).await {
            Ok(result) => {
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                CallToolResult::new(SuccessEnvelope::from_result(&self.engine, name, result, elapsed), false)?
            }
            Err(e) => CallToolResult::new(ErrorEnvelope::from_error(&self.engine, name, &e), true)?,
        };
        Ok(value)
    }
}

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

/// Returns server capabilities and metadata.
fn handle_initialize() -> Result<Value> {
    Ok(json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "tabletalk",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Returns the list of available MCP tools with their schemas.
fn handle_list_tools() -> Result<Value> {
    let tools: Vec<Value> = catalog()
        .into_iter()
        .map(|spec| {
            json!({
                "name": spec.name.as_str(),
                "description": spec.description,
                "inputSchema": spec.input_schema,
            })
        })
        .collect();

    Ok(json!({ "tools": tools }))
}
