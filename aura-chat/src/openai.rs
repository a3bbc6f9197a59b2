//! OpenAI-compatible completion endpoint client.
//!
//! Works against any server exposing the `chat/completions` shape
//! (OpenAI, DeepSeek, OpenRouter, local gateways). Requests are always
//! non-streamed: the discrete voice loop and the chat UI both want one
//! finished reply per turn.

use crate::error::{ChatError, Result};
use crate::model::{ChatModel, ChatReply, ChatRequest};
use async_trait::async_trait;
use aura_core::{Role, ToolDefinition, ToolInvocation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
    model: String,
}

impl OpenAiChatModel {
    /// Create a client. `base_url` is the API root, e.g.
    /// `https://api.deepseek.com` — the `chat/completions` path is appended.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        // A trailing slash keeps prefixed roots (e.g. `/v1`) intact on join.
        let mut base = Url::parse(base_url)
            .map_err(|e| ChatError::config(format!("Invalid base URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| ChatError::config(format!("Invalid endpoint path: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ChatError::config(format!("HTTP client build failed: {e}")))?;

        Ok(Self { http, endpoint, api_key: SecretString::from(api_key.into()), model: model.into() })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        for turn in &request.turns {
            let role = match turn.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            messages.push(json!({ "role": role, "content": turn.text }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_to_wire).collect());
        }

        body
    }
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description.clone().unwrap_or_default(),
            "parameters": tool
                .parameters
                .clone()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    /// JSON-encoded argument object, per the OpenAI wire format.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn status_error(status: u16, body: &str) -> ChatError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .unwrap_or_else(|| format!("API error: {status}"));

    match status {
        401 | 403 => ChatError::AuthFailure(message),
        _ => ChatError::RemoteUnavailable { status, message },
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn provider(&self) -> &str {
        "openai-compatible"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let body = self.build_body(request);
        tracing::debug!(model = %self.model, turns = request.turns.len(), "Sending completion request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::NetworkUnreachable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::NetworkUnreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        let parsed: ApiResponse = serde_json::from_str(&text)
            .map_err(|e| ChatError::protocol(format!("Unexpected response shape: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::protocol("Response carried no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolInvocation {
                correlation_id: call.id,
                name: call.function.name,
                // Malformed argument payloads degrade to an empty object;
                // the broker reports the miss instead of the session dying.
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| json!({})),
            })
            .collect();

        Ok(ChatReply { text: choice.message.content.unwrap_or_default(), tool_calls })
    }
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(status_error(401, "{}"), ChatError::AuthFailure(_)));
        assert!(matches!(status_error(403, "{}"), ChatError::AuthFailure(_)));
        assert!(matches!(
            status_error(500, "{}"),
            ChatError::RemoteUnavailable { status: 500, .. }
        ));
    }

    #[test]
    fn test_status_error_extracts_body_message() {
        let err = status_error(429, r#"{"error":{"message":"slow down"}}"#);
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_tool_wire_shape_defaults() {
        let wire = tool_to_wire(&ToolDefinition::new("open_app"));
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "open_app");
        assert_eq!(wire["function"]["parameters"]["type"], "object");
    }
}
