//! Rolling-window chat sessions.
//!
//! A session owns a system prompt and the in-memory turn history handed to
//! the completion endpoint. The window is bounded: once it exceeds
//! [`HISTORY_WINDOW_TURNS`], the oldest user/assistant pair is evicted so
//! the request payload stays flat no matter how long the conversation runs.

use crate::error::Result;
use crate::model::{ChatModel, ChatRequest};
use aura_core::markup::extract_reaction;
use aura_core::{ToolDefinition, ToolInvocation, TranscriptTurn};
use std::sync::Arc;

/// Maximum turns kept in the rolling request window.
pub const HISTORY_WINDOW_TURNS: usize = 10;

/// The processed result of one chat round.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Display text with the reaction tag removed. Never empty: tool-only
    /// and empty replies get a placeholder line.
    pub text: String,
    /// Emoji reaction the model attached to the user's message, if any.
    pub reaction: Option<String>,
    /// Tool calls requested by the model, for the host's broker.
    pub tool_calls: Vec<ToolInvocation>,
}

/// A conversation against one completion model.
pub struct ChatSession {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    history: Vec<TranscriptTurn>,
    temperature: f32,
}

impl ChatSession {
    /// Create a session with an empty history.
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            history: Vec::new(),
            temperature: 0.6,
        }
    }

    /// Advertise tools with every request.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Current rolling history (for persistence or inspection).
    pub fn history(&self) -> &[TranscriptTurn] {
        &self.history
    }

    /// Seed the window from persisted history. Only the most recent
    /// [`HISTORY_WINDOW_TURNS`] turns are kept.
    pub fn with_history(mut self, turns: Vec<TranscriptTurn>) -> Self {
        self.history = turns;
        trim_window(&mut self.history);
        self
    }

    /// Run one user turn through the model.
    ///
    /// A recoverable failure (network, 5xx) is retried once before being
    /// surfaced; the history is only advanced on success.
    pub async fn send(&mut self, user_text: &str) -> Result<ChatOutcome> {
        let mut turns = self.history.clone();
        turns.push(TranscriptTurn::user(user_text));

        let request = ChatRequest {
            system_prompt: self.system_prompt.clone(),
            turns,
            tools: self.tools.clone(),
            temperature: self.temperature,
        };

        let reply = match self.model.complete(&request).await {
            Ok(reply) => reply,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Completion failed, retrying once");
                self.model.complete(&request).await?
            }
            Err(e) => return Err(e),
        };

        let (mut text, reaction) = extract_reaction(&reply.text);
        if text.is_empty() {
            text = if let Some(call) = reply.tool_calls.first() {
                format!("[Executing {}…]", call.name)
            } else {
                "[Received empty response]".to_string()
            };
        }

        self.history.push(TranscriptTurn::user(user_text));
        self.history.push(TranscriptTurn::assistant(&text));
        trim_window(&mut self.history);

        Ok(ChatOutcome { text, reaction, tool_calls: reply.tool_calls })
    }
}

fn trim_window(history: &mut Vec<TranscriptTurn>) {
    while history.len() > HISTORY_WINDOW_TURNS {
        history.drain(0..2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::model::ChatReply;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted model: pops replies front-to-back, errors when scripted.
    struct ScriptedModel {
        replies: std::sync::Mutex<Vec<std::result::Result<ChatReply, ChatError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: Vec<std::result::Result<ChatReply, ChatError>>) -> Self {
            Self { replies: std::sync::Mutex::new(replies), calls: AtomicUsize::new(0) }
        }

        fn text(text: &str) -> std::result::Result<ChatReply, ChatError> {
            Ok(ChatReply { text: text.to_string(), tool_calls: Vec::new() })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn test_send_appends_history_and_extracts_reaction() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text(
            "Good morning! [REACT: ☀️]",
        )]));
        let mut session = ChatSession::new(model, "be brief");

        let outcome = session.send("gm").await.unwrap();
        assert_eq!(outcome.text, "Good morning!");
        assert_eq!(outcome.reaction.as_deref(), Some("☀️"));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].text, "Good morning!");
    }

    #[tokio::test]
    async fn test_window_evicts_oldest_pair() {
        let replies = (0..8).map(|i| ScriptedModel::text(&format!("r{i}"))).collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let mut session = ChatSession::new(model, "p");

        for i in 0..8 {
            session.send(&format!("q{i}")).await.unwrap();
        }

        assert_eq!(session.history().len(), HISTORY_WINDOW_TURNS);
        // Oldest surviving turn is q3: pairs q0..q2 were evicted.
        assert_eq!(session.history()[0].text, "q3");
    }

    #[tokio::test]
    async fn test_recoverable_failure_retries_once() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ChatError::RemoteUnavailable { status: 503, message: "busy".into() }),
            ScriptedModel::text("second try"),
        ]));
        let mut session = ChatSession::new(model.clone(), "p");

        let outcome = session.send("hello").await.unwrap();
        assert_eq!(outcome.text, "second try");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ChatError::AuthFailure("bad key".into())),
            ScriptedModel::text("never reached"),
        ]));
        let mut session = ChatSession::new(model.clone(), "p");

        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::AuthFailure(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        // Failed turns never advance the window.
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_tool_only_reply_gets_placeholder() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(ChatReply {
            text: String::new(),
            tool_calls: vec![ToolInvocation {
                correlation_id: "c1".into(),
                name: "open_app".into(),
                arguments: serde_json::json!({"app_name": "maps"}),
            }],
        })]));
        let mut session = ChatSession::new(model, "p");

        let outcome = session.send("open maps").await.unwrap();
        assert_eq!(outcome.text, "[Executing open_app…]");
        assert_eq!(outcome.tool_calls.len(), 1);
    }
}
