//! LLM provider clients.
//!
//! Each backend is a plain request/response HTTP client behind the
//! [`ChatProvider`] trait: `chat(messages, context) -> text`. When document
//! context is supplied it is injected as a leading system message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{OllamaConfig, OpenAiConfig};
use super::errors::InferenceError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OllamaChatRequest,
    OllamaChatResponse,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for a chat call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ─── ChatProvider ────────────────────────────────────────────────────────────

/// A language-model backend that answers a conversation.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable name, e.g. `Ollama (llama3.2)`.
    fn display_name(&self) -> String;

    /// Answer the conversation, grounding on `context` when given.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        context: Option<&str>,
    ) -> Result<String, InferenceError>;
}

/// System prompt wrapping the document context gathered from the tool server.
pub fn context_system_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant that can search and analyze documents.\n\
         You have access to document search tools that have provided this relevant information:\n\n\
         {context}\n\n\
         Use this information to answer the user's question. Be specific and cite the \
         information from the documents when relevant."
    )
}

/// Prepend the context system message (if any) to the conversation.
pub fn build_messages(messages: &[ChatMessage], context: Option<&str>) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        out.push(ChatMessage::system(context_system_prompt(context)));
    }
    out.extend_from_slice(messages);
    out
}

fn build_http_client(endpoint: &str) -> Result<HttpClient, InferenceError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| InferenceError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ─── Ollama ──────────────────────────────────────────────────────────────────

/// Client for a local Ollama server (`/api/chat`, non-streaming).
pub struct OllamaProvider {
    http: HttpClient,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            http: build_http_client(&config.base_url)?,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn display_name(&self) -> String {
        format!("Ollama ({})", self.model)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        context: Option<&str>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: self.model.clone(),
            messages: build_messages(messages, context),
            stream: false,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            has_context = context.is_some(),
            "ollama chat request"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(&url, REQUEST_TIMEOUT.as_secs(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: OllamaChatResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse {
                    provider: self.display_name(),
                    reason: e.to_string(),
                })?;

        Ok(parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_else(|| "No response".to_string()))
    }
}

// ─── OpenAI ──────────────────────────────────────────────────────────────────

/// Client for the OpenAI Chat Completions API (or a compatible endpoint).
pub struct OpenAiProvider {
    http: HttpClient,
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Fails with `ConfigError` when no API key is configured.
    pub fn new(config: &OpenAiConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::ConfigError {
                reason: "OpenAI provider requires an API key".into(),
            })?;

        Ok(Self {
            http: build_http_client(&config.base_url)?,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn display_name(&self) -> String {
        format!("OpenAI ({})", self.model)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        context: Option<&str>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(messages, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            has_context = context.is_some(),
            max_tokens = body.max_tokens,
            "openai chat request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(&url, REQUEST_TIMEOUT.as_secs(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse {
                    provider: self.display_name(),
                    reason: e.to_string(),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| InferenceError::InvalidResponse {
                provider: self.display_name(),
                reason: "response has no choices".into(),
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
