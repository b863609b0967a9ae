//! Inference: LLM backends behind a single `chat(messages, context)` call.
//!
//! This module handles:
//! - The `ChatProvider` trait and its Ollama / OpenAI implementations
//! - Injecting document search context as a system prompt
//! - Provider registration and switching (`ProviderManager`)
//! - Provider settings and `${VAR}` interpolation for the config file
//!
//! It is independent of the MCP client; the chat app wires the two together.

pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod types;

// Re-exports for convenience
pub use client::{ChatProvider, OllamaProvider, OpenAiProvider};
pub use config::{OllamaConfig, OpenAiConfig, ProvidersConfig};
pub use errors::InferenceError;
pub use manager::ProviderManager;
pub use types::{ChatMessage, Role};
