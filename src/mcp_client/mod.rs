//! MCP Client: JSON-RPC over stdio for a single tool server.
//!
//! This module handles:
//! - Spawning the server child process and owning its pipes (`transport`)
//! - The `initialize` handshake and `tools/list` discovery (`session`)
//! - `tools/call` round trips and result decoding (`invoker`)
//! - Startup ordering and guaranteed teardown (`lifecycle`)
//!
//! Requests are strictly one at a time: one line out, one line back.

pub mod catalog;
pub mod errors;
pub mod invoker;
pub mod lifecycle;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use catalog::ToolCatalog;
pub use errors::McpError;
pub use invoker::{Invoker, SearchTool};
pub use lifecycle::{ConnectionState, McpClient};
pub use session::{Session, SessionPhase};
pub use transport::StdioTransport;
pub use types::{ClientConfig, ClientInfo, ServerConfig, Tool, ToolOutput};
