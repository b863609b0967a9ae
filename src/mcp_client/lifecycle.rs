//! Client lifecycle: startup ordering, call gating, and guaranteed teardown.
//!
//! `McpClient` walks `Unstarted → Starting → Handshaking → Discovering →
//! Ready → Closing → Closed`. Any setup failure closes the partially started
//! server before the error is returned, and any fatal failure during a call
//! does the same. The child is spawned with `kill_on_drop`, so dropping a
//! client without `shutdown` still terminates it.

use std::fmt;

use serde_json::Value;

use super::catalog::ToolCatalog;
use super::errors::McpError;
use super::invoker::Invoker;
use super::session::Session;
use super::transport::StdioTransport;
use super::types::{ClientConfig, ServerInfo};

/// Connection state of an [`McpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unstarted,
    Starting,
    Handshaking,
    Discovering,
    Ready,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unstarted => "unstarted",
            ConnectionState::Starting => "starting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handle to one MCP server: owns the process, the session, and the catalog.
#[derive(Debug)]
pub struct McpClient {
    config: ClientConfig,
    state: ConnectionState,
    session: Option<Session>,
}

impl McpClient {
    /// Create an unstarted client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Unstarted,
            session: None,
        }
    }

    /// Create a client and connect it.
    ///
    /// On failure nothing is left running.
    pub async fn start(config: ClientConfig) -> Result<Self, McpError> {
        let mut client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn server_name(&self) -> &str {
        &self.config.server.name
    }

    /// Process id of the running server, if any.
    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.transport().pid())
    }

    /// The discovered tool catalog (empty unless `Ready`).
    pub fn tools(&self) -> &ToolCatalog {
        static EMPTY: std::sync::OnceLock<ToolCatalog> = std::sync::OnceLock::new();
        match &self.session {
            Some(session) => session.catalog(),
            None => EMPTY.get_or_init(ToolCatalog::default),
        }
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.session.as_ref().and_then(Session::server_info)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn the server, perform the handshake, and discover tools.
    ///
    /// If any step fails the server is shut down before the error is returned.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        if self.state != ConnectionState::Unstarted {
            return Err(McpError::SequenceViolation {
                reason: format!("connect called on a {} client", self.state),
            });
        }

        self.state = ConnectionState::Starting;
        let transport = match StdioTransport::start(&self.config.server, self.config.shutdown_grace) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(server = %self.server_name(), error = %e, "server spawn failed");
                self.state = ConnectionState::Closed;
                return Err(e);
            }
        };

        self.session = Some(Session::new(
            transport,
            self.config.client_info.clone(),
            self.config.init_timeout,
        ));

        match self.run_setup().await {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                tracing::info!(
                    server = %self.server_name(),
                    tool_count = self.tools().len(),
                    "MCP client ready"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    server = %self.server_name(),
                    state = %self.state,
                    error = %e,
                    "MCP client setup failed"
                );
                self.shutdown().await;
                Err(e)
            }
        }
    }

    async fn run_setup(&mut self) -> Result<(), McpError> {
        let server = self.config.server.name.clone();
        let session = self
            .session
            .as_mut()
            .ok_or(McpError::Disconnected { server })?;

        self.state = ConnectionState::Handshaking;
        session.handshake().await?;

        self.state = ConnectionState::Discovering;
        session.discover_tools().await?;
        Ok(())
    }

    /// Terminate the server. Safe to call in any state, any number of times.
    pub async fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.state = ConnectionState::Closing;
            session.close().await;
        }
        self.state = ConnectionState::Closed;
    }

    // ─── Tool Calls ──────────────────────────────────────────────────────

    /// Call a tool; error replies come back as `"Error: <message>"` text.
    ///
    /// Fatal errors (broken pipe, EOF, malformed reply, id mismatch, timeout)
    /// shut the client down before being returned.
    pub async fn call(&mut self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        let timeout = self.config.call_timeout;
        let session = self.ready_session()?;
        let result = Invoker::new(session, timeout).call(tool_name, arguments).await;
        self.settle(result).await
    }

    /// Call a tool; error replies become `McpError::ToolCallFailed`.
    pub async fn call_strict(&mut self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        let timeout = self.config.call_timeout;
        let session = self.ready_session()?;
        let result = Invoker::new(session, timeout).call_strict(tool_name, arguments).await;
        self.settle(result).await
    }

    /// Search the document catalog (`catalog_search`).
    pub async fn search_catalog(&mut self, text: &str) -> Result<String, McpError> {
        let timeout = self.config.call_timeout;
        let session = self.ready_session()?;
        let result = Invoker::new(session, timeout).search_catalog(text).await;
        self.settle(result).await
    }

    /// Search document chunks (`chunks_search` with a source, `all_chunks_search` without).
    pub async fn search_chunks(&mut self, text: &str, source: Option<&str>) -> Result<String, McpError> {
        let timeout = self.config.call_timeout;
        let session = self.ready_session()?;
        let result = Invoker::new(session, timeout).search_chunks(text, source).await;
        self.settle(result).await
    }

    fn ready_session(&mut self) -> Result<&mut Session, McpError> {
        let state = self.state;
        match (state, self.session.as_mut()) {
            (ConnectionState::Ready, Some(session)) => Ok(session),
            _ => Err(McpError::NotConnected {
                state: state.to_string(),
            }),
        }
    }

    /// Close the client when a call failed fatally, then hand back the result.
    async fn settle<T>(&mut self, result: Result<T, McpError>) -> Result<T, McpError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(server = %self.server_name(), error = %e, "fatal MCP error, closing client");
                self.shutdown().await;
            }
        }
        result
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::ServerConfig;
    use serde_json::json;

    fn config(command: &str) -> ClientConfig {
        ClientConfig::new(ServerConfig::new(command, &[]))
    }

    #[test]
    fn test_new_client_unstarted() {
        let client = McpClient::new(config("node"));
        assert_eq!(client.state(), ConnectionState::Unstarted);
        assert!(client.tools().is_empty());
        assert!(client.pid().is_none());
    }

    #[tokio::test]
    async fn test_call_before_connect_is_not_connected() {
        let mut client = McpClient::new(config("node"));
        let err = client.call("catalog_search", json!({"text": "x"})).await.unwrap_err();
        match err {
            McpError::NotConnected { state } => assert_eq!(state, "unstarted"),
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_closes_client() {
        let mut client = McpClient::new(config("/nonexistent/lance-mcp-runtime"));
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::SpawnFailed { .. }));
        assert_eq!(client.state(), ConnectionState::Closed);

        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let mut client = McpClient::new(config("/nonexistent/lance-mcp-runtime"));
        let _ = client.connect().await;
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::SequenceViolation { .. }));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Handshaking.to_string(), "handshaking");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}
