//! Completion model trait definition.

use crate::error::Result;
use async_trait::async_trait;
use aura_core::{ToolDefinition, ToolInvocation, TranscriptTurn};

/// One complete, non-streamed completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System prompt for this conversation.
    pub system_prompt: String,
    /// Prior turns plus the new user turn, oldest first.
    pub turns: Vec<TranscriptTurn>,
    /// Tools advertised to the model.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ChatRequest {
    /// Create a request with the default temperature.
    pub fn new(system_prompt: impl Into<String>, turns: Vec<TranscriptTurn>) -> Self {
        Self { system_prompt: system_prompt.into(), turns, tools: Vec::new(), temperature: 0.6 }
    }

    /// Advertise tools with this request.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// The model's answer to one request.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    /// Reply text. May still carry reasoning/reaction markup; callers
    /// post-process with `aura_core::markup`.
    pub text: String,
    /// Tool calls requested instead of (or alongside) text.
    pub tool_calls: Vec<ToolInvocation>,
}

/// A completion endpoint, consumed as an opaque request/response
/// collaborator.
///
/// Implementations map transport failures onto the [`crate::ChatError`]
/// taxonomy so callers can distinguish auth, remote and network causes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logs (e.g. "openai-compatible").
    fn provider(&self) -> &str;

    /// Model identifier sent with each request.
    fn model_id(&self) -> &str;

    /// Run one completion round trip.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}
