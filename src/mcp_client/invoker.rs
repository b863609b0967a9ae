//! Tool invocation: `tools/call` round trips and result decoding.
//!
//! Result decoding follows the content-list convention: the first content
//! element's `text` is the answer. Tools that return anything else get the
//! whole result rendered as JSON. Error replies become `"Error: <message>"`
//! text for chat callers, or `McpError::ToolCallFailed` for strict callers.

use std::time::Duration;

use serde_json::{json, Value};

use super::errors::McpError;
use super::session::Session;
use super::types::{methods, ResponseOutcome, ToolOutput};

// ─── Search Tools ────────────────────────────────────────────────────────────

/// The document-search tools exposed by lance-mcp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTool {
    /// Search document summaries.
    Catalog,
    /// Search chunks of one source document.
    Chunks,
    /// Search chunks across every document.
    AllChunks,
}

impl SearchTool {
    /// Wire name of the tool.
    pub fn tool_name(self) -> &'static str {
        match self {
            SearchTool::Catalog => "catalog_search",
            SearchTool::Chunks => "chunks_search",
            SearchTool::AllChunks => "all_chunks_search",
        }
    }

    /// Pick the chunk search variant for an optional source filter.
    ///
    /// An empty source means no filter.
    pub fn for_chunks(source: Option<&str>) -> Self {
        match non_empty(source) {
            Some(_) => SearchTool::Chunks,
            None => SearchTool::AllChunks,
        }
    }

    /// Arguments object for a query against this tool.
    pub fn arguments(self, text: &str, source: Option<&str>) -> Value {
        match (self, non_empty(source)) {
            (SearchTool::Chunks, Some(source)) => json!({ "text": text, "source": source }),
            _ => json!({ "text": text }),
        }
    }
}

fn non_empty(source: Option<&str>) -> Option<&str> {
    source.filter(|s| !s.is_empty())
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Extract the answer text from a successful `tools/call` result.
pub fn decode_tool_result(result: &Value) -> String {
    if let Some(first) = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
    {
        return first
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Map a reply outcome onto a [`ToolOutput`].
pub fn decode_outcome(outcome: ResponseOutcome) -> ToolOutput {
    match outcome {
        ResponseOutcome::Result(result) => ToolOutput::Text(decode_tool_result(&result)),
        ResponseOutcome::Error(err) => ToolOutput::Error {
            code: err.code,
            message: err.message,
        },
    }
}

// ─── Invoker ─────────────────────────────────────────────────────────────────

/// Issues tool calls over a ready session.
///
/// Borrowed for the duration of a call; the tool name is not checked against
/// the catalog, the server decides.
pub struct Invoker<'a> {
    session: &'a mut Session,
    timeout: Option<Duration>,
}

impl<'a> Invoker<'a> {
    pub fn new(session: &'a mut Session, timeout: Option<Duration>) -> Self {
        Self { session, timeout }
    }

    /// Call a tool and return the decoded outcome.
    pub async fn call_raw(&mut self, tool_name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let outcome = self
            .session
            .request_within(methods::TOOLS_CALL, Some(params), self.timeout)
            .await
            .map_err(|e| match e {
                McpError::Timeout { timeout_ms, .. } => McpError::Timeout {
                    operation: format!("tool call '{tool_name}'"),
                    timeout_ms,
                },
                other => other,
            })?;

        let output = decode_outcome(outcome);
        if let ToolOutput::Error { code, message } = &output {
            tracing::warn!(tool = tool_name, code, message = %message, "tool call returned an error");
        }
        Ok(output)
    }

    /// Call a tool; error replies come back as `"Error: <message>"` text.
    pub async fn call(&mut self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        Ok(self.call_raw(tool_name, arguments).await?.into_text())
    }

    /// Call a tool; error replies become `McpError::ToolCallFailed`.
    pub async fn call_strict(&mut self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        match self.call_raw(tool_name, arguments).await? {
            ToolOutput::Text(text) => Ok(text),
            ToolOutput::Error { code, message } => Err(McpError::ToolCallFailed { code, message }),
        }
    }

    /// Search the document catalog.
    pub async fn search_catalog(&mut self, text: &str) -> Result<String, McpError> {
        let tool = SearchTool::Catalog;
        self.call(tool.tool_name(), tool.arguments(text, None)).await
    }

    /// Search document chunks, restricted to `source` when given.
    pub async fn search_chunks(&mut self, text: &str, source: Option<&str>) -> Result<String, McpError> {
        let tool = SearchTool::for_chunks(source);
        self.call(tool.tool_name(), tool.arguments(text, source)).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
