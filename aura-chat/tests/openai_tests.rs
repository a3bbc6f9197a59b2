//! Integration tests for the OpenAI-compatible client against a mock server.

use aura_chat::{ChatError, ChatModel, ChatRequest, ChatSession, OpenAiChatModel, builtin_tools};
use aura_core::TranscriptTurn;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reply_body(content: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content }
        }]
    })
}

#[tokio::test]
async fn test_complete_sends_expected_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("hi there")))
        .expect(1)
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(&server.uri(), "sk-test", "test-model").unwrap();
    let request = ChatRequest::new("be brief", vec![TranscriptTurn::user("hello")]);

    let reply = model.complete(&request).await.unwrap();
    assert_eq!(reply.text, "hi there");
    assert!(reply.tool_calls.is_empty());
}

#[tokio::test]
async fn test_complete_parses_tool_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_42",
                        "type": "function",
                        "function": {
                            "name": "open_app",
                            "arguments": "{\"app_name\":\"spotify\"}"
                        }
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(&server.uri(), "sk-test", "test-model").unwrap();
    let request = ChatRequest::new("p", vec![TranscriptTurn::user("play music")])
        .with_tools(builtin_tools());

    let reply = model.complete(&request).await.unwrap();
    assert!(reply.text.is_empty());
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].correlation_id, "call_42");
    assert_eq!(reply.tool_calls[0].arguments["app_name"], "spotify");
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Invalid API key"}})),
        )
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(&server.uri(), "sk-bad", "test-model").unwrap();
    let request = ChatRequest::new("p", vec![TranscriptTurn::user("hi")]);

    let err = model.complete(&request).await.unwrap_err();
    match err {
        ChatError::AuthFailure(msg) => assert!(msg.contains("Invalid API key")),
        other => panic!("Expected AuthFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_response_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(&server.uri(), "sk", "m").unwrap();
    let request = ChatRequest::new("p", vec![TranscriptTurn::user("hi")]);

    assert!(matches!(model.complete(&request).await.unwrap_err(), ChatError::Protocol(_)));
}

#[tokio::test]
async fn test_session_retries_a_server_error_once() {
    let server = MockServer::start().await;

    // First attempt fails with a recoverable 503...
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // ...the automatic retry lands on a healthy endpoint.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("recovered")))
        .mount(&server)
        .await;

    let model = Arc::new(OpenAiChatModel::new(&server.uri(), "sk", "m").unwrap());
    let mut session = ChatSession::new(model, "p");

    let outcome = session.send("hello").await.unwrap();
    assert_eq!(outcome.text, "recovered");
}

#[tokio::test]
async fn test_versioned_base_url_keeps_prefix() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/v1", server.uri());
    let model = OpenAiChatModel::new(&base, "sk", "m").unwrap();
    let request = ChatRequest::new("p", vec![TranscriptTurn::user("hi")]);

    assert_eq!(model.complete(&request).await.unwrap().text, "ok");
}
