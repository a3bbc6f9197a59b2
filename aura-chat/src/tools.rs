//! Built-in tool declarations and the app directory.
//!
//! The model can ask the client to open a well-known app/site or to send an
//! SMS. Actually performing the side effect belongs to the host; the default
//! [`AppDirectoryBroker`] resolves app names against the directory and
//! reports what it would do, which is enough for tests and headless hosts.

use async_trait::async_trait;
use aura_core::{ToolBroker, ToolDefinition, ToolInvocation};
use serde_json::json;

/// Known app name → URL pairs, matched case-insensitively.
pub const APP_DIRECTORY: &[(&str, &str)] = &[
    ("youtube", "https://www.youtube.com"),
    ("google", "https://www.google.com"),
    ("spotify", "https://open.spotify.com"),
    ("gmail", "https://mail.google.com"),
    ("github", "https://github.com"),
    ("whatsapp", "https://web.whatsapp.com"),
    ("netflix", "https://www.netflix.com"),
    ("twitter", "https://x.com"),
    ("x", "https://x.com"),
    ("instagram", "https://www.instagram.com"),
    ("linkedin", "https://www.linkedin.com"),
    ("facebook", "https://www.facebook.com"),
];

/// Resolve an app name to its URL, case-insensitively.
pub fn app_url(name: &str) -> Option<&'static str> {
    let name = name.trim();
    APP_DIRECTORY
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, url)| *url)
}

/// Declaration of the `open_app` tool.
pub fn open_app_tool() -> ToolDefinition {
    ToolDefinition::new("open_app")
        .with_description("Opens an application or website.")
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "app_name": {
                    "type": "string",
                    "description": "The name of the app to open.",
                }
            },
            "required": ["app_name"],
        }))
}

/// Declaration of the `send_sms` tool.
pub fn send_sms_tool() -> ToolDefinition {
    ToolDefinition::new("send_sms")
        .with_description("Sends an SMS message.")
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "recipient": { "type": "string" },
                "message": { "type": "string" },
            },
            "required": ["recipient", "message"],
        }))
}

/// The full built-in tool set.
pub fn builtin_tools() -> Vec<ToolDefinition> {
    vec![open_app_tool(), send_sms_tool()]
}

/// Default broker backed by [`APP_DIRECTORY`].
#[derive(Debug, Default)]
pub struct AppDirectoryBroker;

#[async_trait]
impl ToolBroker for AppDirectoryBroker {
    async fn execute(&self, invocation: &ToolInvocation) -> String {
        match invocation.name.as_str() {
            "open_app" => {
                let name = invocation
                    .arguments
                    .get("app_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                match app_url(name) {
                    Some(url) => format!("Opening {name}: {url}"),
                    None => format!("Unknown app: {name}"),
                }
            }
            "send_sms" => {
                let recipient = invocation
                    .arguments
                    .get("recipient")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                format!("SMS queued for {recipient}")
            }
            other => format!("Unknown tool: {other}"),
        }
    }
}
