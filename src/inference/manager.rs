//! Provider registry with a switchable current provider.

use super::client::{ChatProvider, OllamaProvider, OpenAiProvider};
use super::config::ProvidersConfig;
use super::errors::InferenceError;

/// Named LLM providers; the first one added becomes current.
#[derive(Default)]
pub struct ProviderManager {
    providers: Vec<(String, Box<dyn ChatProvider>)>,
    current: Option<String>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the providers enabled in `config`.
    ///
    /// Ollama is added when enabled; OpenAI only when an API key is set.
    /// `config.default` selects the current provider when it names one.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, InferenceError> {
        let mut manager = Self::new();

        if config.ollama.enabled {
            manager.add("ollama", Box::new(OllamaProvider::new(&config.ollama)?));
        }

        match OpenAiProvider::new(&config.openai) {
            Ok(provider) => manager.add("openai", Box::new(provider)),
            Err(InferenceError::ConfigError { reason }) => {
                tracing::info!(reason = %reason, "openai provider not configured");
            }
            Err(e) => return Err(e),
        }

        if let Some(name) = &config.default {
            manager.switch(name)?;
        }

        Ok(manager)
    }

    /// Add (or replace) a provider under `name`.
    pub fn add(&mut self, name: &str, provider: Box<dyn ChatProvider>) {
        tracing::info!(provider = name, display = %provider.display_name(), "registered LLM provider");
        match self.providers.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = provider,
            None => self.providers.push((name.to_string(), provider)),
        }
        if self.current.is_none() {
            self.current = Some(name.to_string());
        }
    }

    /// Make `name` the current provider.
    pub fn switch(&mut self, name: &str) -> Result<&dyn ChatProvider, InferenceError> {
        let unknown = || InferenceError::UnknownProvider {
            name: name.to_string(),
        };
        if self.get(name).is_none() {
            return Err(unknown());
        }
        self.current = Some(name.to_string());
        self.get(name).ok_or_else(unknown)
    }

    pub fn get(&self, name: &str) -> Option<&dyn ChatProvider> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_ref())
    }

    /// The current provider, if any has been registered.
    pub fn current(&self) -> Option<&dyn ChatProvider> {
        self.current.as_deref().and_then(|name| self.get(name))
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Provider names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// `(name, display name, is_current)` for each provider.
    pub fn describe(&self) -> Vec<(String, String, bool)> {
        self.providers
            .iter()
            .map(|(name, provider)| {
                (
                    name.clone(),
                    provider.display_name(),
                    self.current.as_deref() == Some(name.as_str()),
                )
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
