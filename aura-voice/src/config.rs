//! Configuration types for voice calls.

use crate::codec::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use aura_core::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Configuration for one voice call, shared by both session modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Model identifier, provider-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// System prompt for the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Voice-profile identifier for audio output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_profile: Option<String>,

    /// Tools advertised on the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Capture sample rate sent on the wire.
    pub input_sample_rate: u32,

    /// Expected playback sample rate of model audio.
    pub output_sample_rate: u32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            voice_profile: None,
            tools: Vec::new(),
            temperature: None,
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }
}

impl CallConfig {
    /// Create an empty configuration with standard sample rates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the voice profile.
    pub fn with_voice_profile(mut self, voice: impl Into<String>) -> Self {
        self.voice_profile = Some(voice.into());
        self
    }

    /// Add a tool definition.
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set multiple tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sample_rates() {
        let config = CallConfig::new();
        assert_eq!(config.input_sample_rate, 16_000);
        assert_eq!(config.output_sample_rate, 24_000);
    }

    #[test]
    fn test_builder_chaining() {
        let config = CallConfig::new()
            .with_system_prompt("be kind")
            .with_voice_profile("ember")
            .with_tool(ToolDefinition::new("open_app"));
        assert_eq!(config.system_prompt.as_deref(), Some("be kind"));
        assert_eq!(config.voice_profile.as_deref(), Some("ember"));
        assert_eq!(config.tools.len(), 1);
    }
}
