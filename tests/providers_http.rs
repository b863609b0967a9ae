//! HTTP-level tests for the LLM providers against a mock server.

use httpmock::prelude::*;
use serde_json::json;

use lance_chat::inference::{
    ChatMessage, ChatProvider, InferenceError, OllamaConfig, OllamaProvider, OpenAiConfig,
    OpenAiProvider, ProviderManager, ProvidersConfig,
};

fn ollama(base_url: String) -> OllamaProvider {
    OllamaProvider::new(&OllamaConfig {
        enabled: true,
        model: "llama3.2".to_string(),
        base_url,
    })
    .expect("ollama provider")
}

fn openai(base_url: String) -> OpenAiProvider {
    OpenAiProvider::new(&OpenAiConfig {
        base_url,
        api_key: Some("sk-test".to_string()),
        ..OpenAiConfig::default()
    })
    .expect("openai provider")
}

#[tokio::test]
async fn ollama_chat_sends_non_streaming_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").json_body_includes(
            json!({
                "model": "llama3.2",
                "stream": false,
                "messages": [{"role": "user", "content": "what documents do we have?"}]
            })
            .to_string(),
        );
        then.status(200).json_body(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "Two reports."},
            "done": true
        }));
    });

    let provider = ollama(server.base_url());
    let reply = provider
        .chat(&[ChatMessage::user("what documents do we have?")], None)
        .await
        .expect("ollama chat should succeed");

    mock.assert();
    assert_eq!(reply, "Two reports.");
}

#[tokio::test]
async fn ollama_chat_prepends_context_as_system_message() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").json_body_includes(
            json!({
                "messages": [{"role": "system"}, {"role": "user", "content": "budget?"}]
            })
            .to_string(),
        );
        then.status(200)
            .json_body(json!({"message": {"role": "assistant", "content": "42"}}));
    });

    let provider = ollama(format!("{}/", server.base_url()));
    let reply = provider
        .chat(
            &[ChatMessage::user("budget?")],
            Some("Document Catalog Results:\n3 matches"),
        )
        .await
        .expect("ollama chat should succeed");

    mock.assert_calls(1);
    assert_eq!(reply, "42");
}

#[tokio::test]
async fn ollama_missing_message_yields_placeholder() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200).json_body(json!({"done": true}));
    });

    let reply = ollama(server.base_url())
        .chat(&[ChatMessage::user("hi")], None)
        .await
        .expect("ollama chat should succeed");
    assert_eq!(reply, "No response");
}

#[tokio::test]
async fn openai_chat_sends_bearer_auth() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test")
            .json_body_includes(
                json!({
                    "model": "gpt-4o-mini",
                    "max_tokens": 2000,
                    "messages": [{"role": "user", "content": "hello"}]
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "openai ok"},
                "finish_reason": "stop"
            }]
        }));
    });

    let reply = openai(format!("{}/v1", server.base_url()))
        .chat(&[ChatMessage::user("hello")], None)
        .await
        .expect("openai chat should succeed");

    mock.assert();
    assert_eq!(reply, "openai ok");
}

#[tokio::test]
async fn openai_empty_choices_is_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({"choices": []}));
    });

    let err = openai(server.base_url())
        .chat(&[ChatMessage::user("hello")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::InvalidResponse { .. }), "got {err:?}");
}

#[tokio::test]
async fn http_error_status_is_reported_with_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401).body("invalid api key");
    });

    let err = openai(server.base_url())
        .chat(&[ChatMessage::user("hello")], None)
        .await
        .unwrap_err();
    match &err {
        InferenceError::HttpError { status, body } => {
            assert_eq!(*status, 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("expected HttpError, got {other:?}"),
    }
    assert_eq!(err.error_body(), Some("invalid api key"));
}

#[tokio::test]
async fn unreachable_server_is_connection_failure() {
    // Port 1 is reserved and refuses connections.
    let err = ollama("http://127.0.0.1:1".to_string())
        .chat(&[ChatMessage::user("hi")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::ConnectionFailed { .. }), "got {err:?}");
}

#[tokio::test]
async fn manager_routes_to_default_provider() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .json_body(json!({"choices": [{"message": {"content": "from openai"}}]}));
    });

    let mut config = ProvidersConfig::default();
    config.ollama.base_url = "http://127.0.0.1:1".to_string();
    config.openai.base_url = server.base_url();
    config.openai.api_key = Some("sk-test".to_string());
    config.default = Some("openai".to_string());

    let manager = ProviderManager::from_config(&config).expect("manager");
    assert_eq!(manager.list(), vec!["ollama", "openai"]);
    assert_eq!(manager.current_name(), Some("openai"));

    let reply = manager
        .current()
        .expect("current provider")
        .chat(&[ChatMessage::user("hello")], None)
        .await
        .expect("chat should succeed");

    mock.assert();
    assert_eq!(reply, "from openai");
}
