pub mod chat;
pub mod config;
pub mod inference;
pub mod logging;
pub mod mcp_client;

pub use logging::init_tracing;

/// Return the platform-standard data directory for lance-chat.
///
/// Uses `dirs::data_dir()` (for example `~/.local/share/lance-chat` on
/// Linux) and falls back to `~/.lance-chat` when no data directory is known.
pub fn data_dir() -> std::path::PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("lance-chat"),
        None => dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".lance-chat"),
    }
}
