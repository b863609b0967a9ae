//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types and MCP protocol structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC / MCP method names used by the client.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no `id`, no reply).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: u64,
    /// `Some(Value::Null)` for an explicit `"result": null`, `None` when absent.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: u64, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Split into the success value or the error object.
    ///
    /// An `error` member wins over `result`. Returns `None` when the reply
    /// carries neither.
    pub fn into_outcome(self) -> Option<ResponseOutcome> {
        match (self.error, self.result) {
            (Some(err), _) => Some(ResponseOutcome::Error(err)),
            (None, Some(result)) => Some(ResponseOutcome::Result(result)),
            (None, None) => None,
        }
    }
}

/// The payload of a JSON-RPC reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Result(Value),
    Error(JsonRpcError),
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Params of the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Params declaring the `tools` capability for the given client identity.
    pub fn for_client(client_info: ClientInfo) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({ "tools": {} }),
            client_info,
        }
    }
}

/// Client identity sent during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// MCP initialize response payload.
///
/// Every field is optional: a bare `{}` result is an accepted handshake.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResult {
    #[serde(default, alias = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// A tool exposed by the server, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

/// Decoded outcome of a `tools/call` round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// Text extracted from the result's content list, or the rendered result.
    Text(String),
    /// The server answered with a JSON-RPC error object.
    Error { code: i64, message: String },
}

impl ToolOutput {
    /// Render as chat text: errors become `"Error: <message>"`.
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Error { message, .. } => format!("Error: {message}"),
        }
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// How to launch and talk to the tool server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used in logs and error messages.
    #[serde(default = "default_server_name")]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

fn default_server_name() -> String {
    "lance-mcp".to_string()
}

impl ServerConfig {
    /// Config for `command arg...` with default name and no env overrides.
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            name: default_server_name(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}

/// Default timeout for the initialize handshake and discovery.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period per shutdown escalation step.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Session-level settings layered on top of [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub client_info: ClientInfo,
    /// Deadline for each setup round trip. `None` waits forever.
    pub init_timeout: Option<Duration>,
    /// Deadline for each tool call. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Wait between shutdown escalation steps.
    pub shutdown_grace: Duration,
}

impl ClientConfig {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            client_info: ClientInfo::default(),
            init_timeout: Some(DEFAULT_INIT_TIMEOUT),
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_request_round_trip_preserves_fields() {
        let params = serde_json::json!({"name": "catalog_search", "arguments": {"text": "tax"}});
        let req = JsonRpcRequest::new(42, "tools/call", Some(params));
        let json = serde_json::to_string(&req).unwrap();
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);

        let bare = JsonRpcRequest::new(2, "tools/list", None);
        let parsed: JsonRpcRequest =
            serde_json::from_str(&serde_json::to_string(&bare).unwrap()).unwrap();
        assert_eq!(parsed.params, None);
        assert_eq!(parsed, bare);
    }

    #[test]
    fn test_response_round_trip_keeps_result_or_error() {
        let ok = JsonRpcResponse::success(1, serde_json::json!({"tools": []}));
        let parsed: JsonRpcResponse =
            serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
        assert!(parsed.result.is_some());
        assert!(parsed.error.is_none());

        let err = JsonRpcResponse::failure(3, -32601, "Method not found");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("result"));
        let parsed: JsonRpcResponse = serde_json::from_str(&json).unwrap();
        assert!(parsed.result.is_none());
        assert_eq!(parsed.error.as_ref().unwrap().code, -32601);
    }

    #[test]
    fn test_into_outcome_prefers_error() {
        let json = r#"{"jsonrpc":"2.0","id":2,"result":null,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        match resp.into_outcome() {
            Some(ResponseOutcome::Error(err)) => assert_eq!(err.message, "Method not found"),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_null_result_is_a_result() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"id": 5, "result": null}"#).unwrap();
        assert_eq!(resp.into_outcome(), Some(ResponseOutcome::Result(Value::Null)));
    }

    #[test]
    fn test_into_outcome_none_when_empty() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert!(resp.into_outcome().is_none());
    }

    #[test]
    fn test_initialize_params_wire_shape() {
        let params = InitializeParams::for_client(ClientInfo {
            name: "x".into(),
            version: "1.0.0".into(),
        });
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "clientInfo": {"name": "x", "version": "1.0.0"}
            })
        );
    }

    #[test]
    fn test_tool_reads_input_schema() {
        let json = r#"{"name": "catalog_search", "description": "d", "inputSchema": {"type": "object"}}"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_output_error_text() {
        let out = ToolOutput::Error {
            code: -32601,
            message: "Method not found".into(),
        };
        assert_eq!(out.into_text(), "Error: Method not found");
    }
}
