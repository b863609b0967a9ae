//! Protocol session: handshake, tool discovery, and request/reply correlation.
//!
//! A `Session` owns the transport and enforces the protocol order:
//! `initialize` first, then `tools/list` exactly once, then tool calls.
//! Every request is a single round trip; the reply `id` must match the
//! request `id` or the round trip fails with `ProtocolMismatch`.

use std::time::{Duration, Instant};

use serde_json::Value;

use super::catalog::ToolCatalog;
use super::errors::McpError;
use super::transport::StdioTransport;
use super::types::{
    methods, ClientInfo, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ResponseOutcome, ServerInfo, PROTOCOL_VERSION,
};

/// Where the session is in the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport started, no `initialize` yet.
    Fresh,
    /// Handshake accepted, catalog not yet fetched.
    Initialized,
    /// Catalog fetched; tool calls allowed.
    Ready,
}

/// One protocol session over one transport.
#[derive(Debug)]
pub struct Session {
    transport: StdioTransport,
    client_info: ClientInfo,
    next_id: u64,
    phase: SessionPhase,
    catalog: ToolCatalog,
    server_info: Option<ServerInfo>,
    protocol_version: Option<String>,
    setup_timeout: Option<Duration>,
}

impl Session {
    /// Wrap a freshly started transport.
    pub fn new(
        transport: StdioTransport,
        client_info: ClientInfo,
        setup_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            client_info,
            next_id: 1,
            phase: SessionPhase::Fresh,
            catalog: ToolCatalog::default(),
            server_info: None,
            protocol_version: None,
            setup_timeout,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The discovered catalog (empty until `discover_tools` succeeds).
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Server identity reported during the handshake, if any.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Protocol version the server answered with, if any.
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn transport(&self) -> &StdioTransport {
        &self.transport
    }

    /// Tear down the underlying transport. Idempotent.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    // ─── Setup ───────────────────────────────────────────────────────────

    /// Perform the `initialize` exchange.
    pub async fn handshake(&mut self) -> Result<(), McpError> {
        if self.phase != SessionPhase::Fresh {
            return Err(McpError::SequenceViolation {
                reason: "handshake already performed".into(),
            });
        }

        let params = serde_json::to_value(InitializeParams::for_client(self.client_info.clone()))
            .map_err(|e| McpError::HandshakeFailed {
                server: self.server_name(),
                reason: format!("failed to encode initialize params: {e}"),
            })?;

        let timeout = self.setup_timeout;
        let outcome = self
            .request_within(methods::INITIALIZE, Some(params), timeout)
            .await?;

        let result = match outcome {
            ResponseOutcome::Result(result) => result,
            ResponseOutcome::Error(err) => {
                return Err(McpError::HandshakeFailed {
                    server: self.server_name(),
                    reason: err.message,
                });
            }
        };

        let init: InitializeResult = if result.is_null() {
            InitializeResult::default()
        } else {
            serde_json::from_value(result).map_err(|e| McpError::HandshakeFailed {
                server: self.server_name(),
                reason: format!("failed to parse initialize result: {e}"),
            })?
        };

        if let Some(version) = init.protocol_version.as_deref() {
            if version != PROTOCOL_VERSION {
                tracing::warn!(
                    server = %self.server_name(),
                    requested = PROTOCOL_VERSION,
                    negotiated = version,
                    "server negotiated a different protocol version"
                );
            }
        }

        tracing::info!(
            server = %self.server_name(),
            remote_name = ?init.server_info.as_ref().and_then(|s| s.name.as_deref()),
            remote_version = ?init.server_info.as_ref().and_then(|s| s.version.as_deref()),
            "handshake complete"
        );

        self.server_info = init.server_info;
        self.protocol_version = init.protocol_version;
        self.phase = SessionPhase::Initialized;

        self.notify(methods::INITIALIZED, None).await
    }

    /// Fetch `tools/list` and build the catalog. Allowed once, after the handshake.
    pub async fn discover_tools(&mut self) -> Result<&ToolCatalog, McpError> {
        match self.phase {
            SessionPhase::Initialized => {}
            SessionPhase::Fresh => {
                return Err(McpError::SequenceViolation {
                    reason: "discover_tools called before handshake".into(),
                });
            }
            SessionPhase::Ready => {
                return Err(McpError::SequenceViolation {
                    reason: "tool catalog already discovered".into(),
                });
            }
        }

        let timeout = self.setup_timeout;
        let outcome = self.request_within(methods::TOOLS_LIST, None, timeout).await?;

        let result = match outcome {
            ResponseOutcome::Result(result) => result,
            ResponseOutcome::Error(err) => {
                return Err(McpError::DiscoveryFailed {
                    server: self.server_name(),
                    reason: err.message,
                });
            }
        };

        self.catalog =
            ToolCatalog::from_list_result(&result).map_err(|reason| McpError::DiscoveryFailed {
                server: self.server_name(),
                reason,
            })?;
        self.phase = SessionPhase::Ready;

        tracing::info!(
            server = %self.server_name(),
            tool_count = self.catalog.len(),
            tools = ?self.catalog.names(),
            "tool catalog discovered"
        );

        Ok(&self.catalog)
    }

    // ─── Round Trips ─────────────────────────────────────────────────────

    /// One request/reply round trip, optionally bounded by `timeout`.
    pub async fn request_within(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<ResponseOutcome, McpError> {
        match timeout {
            None => self.request(method, params).await,
            Some(limit) => tokio::time::timeout(limit, self.request(method, params))
                .await
                .map_err(|_| McpError::Timeout {
                    operation: method.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })?,
        }
    }

    /// One request/reply round trip: write the request, read its reply.
    ///
    /// Server notifications that arrive before the reply are logged and
    /// skipped. Any other message must be the reply to this request.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<ResponseOutcome, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        let start = Instant::now();
        let request = JsonRpcRequest::new(id, method, params);
        self.transport.send(&request).await?;

        let message = loop {
            let message = self.transport.receive().await?;
            if is_notification(&message) {
                tracing::debug!(
                    server = %self.server_name(),
                    method = ?message.get("method"),
                    "skipping server notification"
                );
                continue;
            }
            break message;
        };

        let response: JsonRpcResponse =
            serde_json::from_value(message).map_err(|e| McpError::ParseFailed {
                server: self.server_name(),
                reason: format!("not a JSON-RPC response: {e}"),
            })?;

        if response.id != id {
            return Err(McpError::ProtocolMismatch {
                expected: id,
                actual: response.id,
            });
        }

        tracing::debug!(
            server = %self.server_name(),
            method,
            id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            is_error = response.error.is_some(),
            "round trip complete"
        );

        response.into_outcome().ok_or_else(|| McpError::ParseFailed {
            server: self.server_name(),
            reason: format!("reply {id} carries neither result nor error"),
        })
    }

    /// Send a notification (no reply expected).
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.transport
            .send(&JsonRpcNotification::new(method, params))
            .await
    }

    fn server_name(&self) -> String {
        self.transport.server_name().to_string()
    }
}

/// A message with a `method` and no `id` is a notification from the server.
fn is_notification(message: &Value) -> bool {
    message.get("method").is_some() && message.get("id").is_none()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
