//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be launched.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// Writing a request to the server's stdin failed (pipe closed, process gone).
    #[error("failed to write to server '{server}': {reason}")]
    WriteFailed { server: String, reason: String },

    /// The server's stdout reached EOF before a reply line arrived.
    #[error("server '{server}' closed its output stream{}", stderr_suffix(.stderr))]
    StreamClosed { server: String, stderr: String },

    /// A reply line was not valid JSON, or not a JSON-RPC response.
    #[error("malformed reply from server '{server}': {reason}")]
    ParseFailed { server: String, reason: String },

    /// The `initialize` exchange was rejected or undecodable.
    #[error("server '{server}' handshake failed: {reason}")]
    HandshakeFailed { server: String, reason: String },

    /// The `tools/list` exchange was rejected or its result malformed.
    #[error("server '{server}' tool discovery failed: {reason}")]
    DiscoveryFailed { server: String, reason: String },

    /// The server answered a tool call with a JSON-RPC error object.
    #[error("tool call failed [{code}]: {message}")]
    ToolCallFailed { code: i64, message: String },

    /// A call was attempted while the client is not in the `Ready` state.
    #[error("not connected (client is {state})")]
    NotConnected { state: String },

    /// The reply `id` did not match the request just sent.
    #[error("reply id {actual} does not match request id {expected}")]
    ProtocolMismatch { expected: u64, actual: u64 },

    /// A round trip exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// An operation was invoked out of protocol order.
    #[error("sequence violation: {reason}")]
    SequenceViolation { reason: String },

    /// The transport has already been torn down.
    #[error("transport for server '{server}' is closed")]
    Disconnected { server: String },
}

impl McpError {
    /// Whether the error leaves the session unusable.
    ///
    /// Fatal errors close the transport; `ToolCallFailed` is local to one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McpError::WriteFailed { .. }
                | McpError::StreamClosed { .. }
                | McpError::ParseFailed { .. }
                | McpError::ProtocolMismatch { .. }
                | McpError::Timeout { .. }
                | McpError::Disconnected { .. }
        )
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}
