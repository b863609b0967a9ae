//! Application configuration.
//!
//! Loaded from an optional YAML file (default `<config_dir>/lance-chat/config.yaml`)
//! after `${VAR}` / `${VAR:-default}` interpolation. Every field has a
//! default, so a missing file or an empty one yields a working config; CLI
//! flags override file values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::inference::config::{expand_tilde, interpolate_env_vars};
use crate::inference::ProvidersConfig;
use crate::mcp_client::{ClientConfig, ClientInfo, ServerConfig};

/// Errors raised while loading configuration or resolving paths.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("{what} not found: {path}")]
    MissingPath { what: String, path: String },
}

/// Top-level config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// How to launch the lance-mcp server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Runtime that executes the server script.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Server script (first positional argument).
    #[serde(default = "default_server_path")]
    pub server_path: String,
    /// Database directory (second positional argument).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Seconds per setup round trip; 0 waits forever.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
    /// Seconds per tool call; 0 waits forever.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            server_path: default_server_path(),
            db_path: default_db_path(),
            env: HashMap::new(),
            cwd: None,
            client_name: default_client_name(),
            client_version: default_client_version(),
            init_timeout_secs: default_init_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_runtime() -> String {
    "node".to_string()
}
fn default_server_path() -> String {
    "../dist/index.js".to_string()
}
fn default_db_path() -> String {
    "../my_doc_index".to_string()
}
fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_init_timeout_secs() -> u64 {
    30
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_shutdown_grace_secs() -> u64 {
    5
}

fn secs_or_forever(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl ServerSection {
    /// Build the MCP client config for already-resolved script and db paths.
    pub fn client_config(&self, server_path: &Path, db_path: &Path) -> ClientConfig {
        let server = ServerConfig {
            name: "lance-mcp".to_string(),
            command: self.runtime.clone(),
            args: vec![
                server_path.to_string_lossy().into_owned(),
                db_path.to_string_lossy().into_owned(),
            ],
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        };

        ClientConfig {
            server,
            client_info: ClientInfo {
                name: self.client_name.clone(),
                version: self.client_version.clone(),
            },
            init_timeout: secs_or_forever(self.init_timeout_secs),
            call_timeout: secs_or_forever(self.call_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lance-chat").join("config.yaml"))
}

/// Load the config file.
///
/// An explicit `path` must exist. Without one, the default location is used
/// if present, otherwise built-in defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(explicit) => explicit.to_path_buf(),
        None => match default_config_path() {
            Some(default) if default.exists() => default,
            _ => {
                tracing::debug!("no config file, using defaults");
                return Ok(AppConfig::default());
            }
        },
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), "loaded config file");
    parse_config(&raw)
}

/// Parse config text after env-var interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// Expand `~`, make absolute, and require that the path exists.
pub fn resolve_existing_path(what: &str, path: &str) -> Result<PathBuf, ConfigError> {
    let expanded = PathBuf::from(expand_tilde(path));
    std::fs::canonicalize(&expanded).map_err(|_| ConfigError::MissingPath {
        what: what.to_string(),
        path: expanded.display().to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.runtime, "node");
        assert_eq!(config.server.init_timeout_secs, 30);
        assert!(config.providers.ollama.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        std::env::set_var("__LANCE_CHAT_CFG_KEY__", "sk-abc");
        let yaml = r#"
            server:
              runtime: bun
              server_path: /srv/lance/dist/index.js
              db_path: /srv/lance/index
              call_timeout_secs: 0
              env:
                LOG_LEVEL: debug
            providers:
              ollama:
                model: mistral
              openai:
                api_key: ${__LANCE_CHAT_CFG_KEY__}
              default: openai
        "#;
        let config = parse_config(yaml).unwrap();
        std::env::remove_var("__LANCE_CHAT_CFG_KEY__");

        assert_eq!(config.server.runtime, "bun");
        assert_eq!(config.server.env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(config.providers.ollama.model, "mistral");
        assert_eq!(config.providers.openai.api_key.as_deref(), Some("sk-abc"));
        assert_eq!(config.providers.default.as_deref(), Some("openai"));

        let client = config
            .server
            .client_config(Path::new("/srv/lance/dist/index.js"), Path::new("/srv/lance/index"));
        assert_eq!(client.server.command, "bun");
        assert_eq!(client.server.args, vec!["/srv/lance/dist/index.js", "/srv/lance/index"]);
        assert!(client.call_timeout.is_none());
        assert_eq!(client.init_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = parse_config("server: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/lance-chat.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_resolve_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_existing_path("db", dir.path().to_str().unwrap()).unwrap();
        assert!(resolved.is_absolute());

        let err = resolve_existing_path("server script", "/nonexistent/index.js").unwrap_err();
        assert_eq!(err.to_string(), "server script not found: /nonexistent/index.js");
    }
}
