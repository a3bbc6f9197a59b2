//! Duplex wire messages.
//!
//! The remote endpoint's message shapes are decoded exactly once, here, at
//! the transport boundary: everything downstream of [`decode_inbound`] works
//! with an explicit tagged union instead of probing optional JSON fields.
//! Outbound messages are the mirror image, encoded by [`encode_outbound`].

use crate::codec::WireAudioPacket;
use crate::config::CallConfig;
use crate::error::{Result, VoiceError};
use aura_core::{ToolDefinition, ToolInvocation, ToolOutcome};
use serde::Serialize;
use serde_json::{Value, json};

// ── Outbound ────────────────────────────────────────────────────────────

/// Messages sent from the client to the duplex endpoint.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Session setup: model, system prompt, voice profile, tools.
    Setup(CallConfig),
    /// A media chunk: encoded microphone audio or an auxiliary screen frame.
    Media(WireAudioPacket),
    /// Answer to a tool invocation.
    ToolOutcome(ToolOutcome),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup: Option<SetupFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<RealtimeInputFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_response: Option<ToolResponseFrame>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    generation_config: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputFrame {
    media_chunks: Vec<WireAudioPacket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseFrame {
    function_responses: Vec<Value>,
}

fn setup_frame(config: &CallConfig) -> SetupFrame {
    let mut generation_config = json!({ "responseModalities": ["AUDIO"] });
    if let Some(voice) = &config.voice_profile {
        generation_config["speechConfig"] =
            json!({ "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } } });
    }
    if let Some(temp) = config.temperature {
        generation_config["temperature"] = json!(temp);
    }

    SetupFrame {
        model: config.model.clone(),
        system_instruction: config
            .system_prompt
            .as_ref()
            .map(|text| json!({ "parts": [{ "text": text }] })),
        generation_config,
        tools: convert_tools(&config.tools),
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<Value>> {
    if tools.is_empty() {
        return None;
    }
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description.clone().unwrap_or_default(),
                "parameters": t
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
            })
        })
        .collect();
    Some(vec![json!({ "functionDeclarations": declarations })])
}

/// Serialize an outbound message into its wire JSON.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String> {
    let frame = match message {
        OutboundMessage::Setup(config) => ClientFrame {
            setup: Some(setup_frame(config)),
            realtime_input: None,
            tool_response: None,
        },
        OutboundMessage::Media(packet) => ClientFrame {
            setup: None,
            realtime_input: Some(RealtimeInputFrame { media_chunks: vec![packet.clone()] }),
            tool_response: None,
        },
        OutboundMessage::ToolOutcome(outcome) => ClientFrame {
            setup: None,
            realtime_input: None,
            tool_response: Some(ToolResponseFrame {
                function_responses: vec![json!({
                    "id": outcome.correlation_id,
                    "response": { "result": outcome.result },
                })],
            }),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

// ── Inbound ─────────────────────────────────────────────────────────────

/// Messages received from the duplex endpoint, after boundary translation.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Setup acknowledged; the session is live.
    Ready,
    /// A chunk of model audio.
    Audio(WireAudioPacket),
    /// The model requests a tool execution.
    ToolCall(ToolInvocation),
    /// Barge-in: halt whatever is playing right now.
    Interrupted,
    /// The model finished its current turn.
    TurnComplete,
    /// Anything unrecognized, kept for forward compatibility. The session
    /// logs and skips these rather than tearing down.
    Unknown,
}

/// Translate one raw wire message into the tagged union.
///
/// Malformed JSON is a protocol violation; unknown-but-well-formed shapes
/// map to [`InboundMessage::Unknown`].
pub fn decode_inbound(raw: &str) -> Result<InboundMessage> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| VoiceError::protocol(format!("Unparseable server message: {e}")))?;

    if value.get("setupComplete").is_some() {
        return Ok(InboundMessage::Ready);
    }

    if let Some(content) = value.get("serverContent") {
        if content.get("interrupted").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(InboundMessage::Interrupted);
        }

        if content.get("turnComplete").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(InboundMessage::TurnComplete);
        }

        if let Some(parts) = content.get("modelTurn").and_then(|t| t.get("parts")).and_then(Value::as_array)
        {
            for part in parts {
                if let Some(inline) = part.get("inlineData") {
                    let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
                    let mime_type = inline
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .unwrap_or("audio/pcm")
                        .to_string();
                    return Ok(InboundMessage::Audio(WireAudioPacket {
                        data: data.to_string(),
                        mime_type,
                    }));
                }
            }
        }
    }

    if let Some(calls) = value
        .get("toolCall")
        .and_then(|t| t.get("functionCalls"))
        .and_then(Value::as_array)
    {
        if let Some(call) = calls.first() {
            return Ok(InboundMessage::ToolCall(ToolInvocation {
                correlation_id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
            }));
        }
    }

    Ok(InboundMessage::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, pcm_mime_type};

    #[test]
    fn test_setup_carries_prompt_voice_and_tools() {
        let config = CallConfig::new()
            .with_model("models/live-audio")
            .with_system_prompt("be warm")
            .with_voice_profile("ember")
            .with_tool(ToolDefinition::new("open_app"));

        let wire = encode_outbound(&OutboundMessage::Setup(config)).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();

        assert_eq!(value["setup"]["model"], "models/live-audio");
        assert_eq!(value["setup"]["systemInstruction"]["parts"][0]["text"], "be warm");
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "ember"
        );
        assert_eq!(
            value["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            "open_app"
        );
    }

    #[test]
    fn test_media_frame_keeps_wire_packet_shape() {
        let packet = encode_frame(&[0.5, -0.5], 16_000);
        let wire = encode_outbound(&OutboundMessage::Media(packet.clone())).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();

        let chunk = &value["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], pcm_mime_type(16_000));
        assert_eq!(chunk["data"], packet.data);
        assert!(value.get("setup").is_none());
    }

    #[test]
    fn test_tool_outcome_frame() {
        let outcome = ToolOutcome { correlation_id: "call-7".into(), result: "done".into() };
        let wire = encode_outbound(&OutboundMessage::ToolOutcome(outcome)).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();

        let response = &value["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "call-7");
        assert_eq!(response["response"]["result"], "done");
    }

    #[test]
    fn test_decode_ready() {
        let msg = decode_inbound(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(msg, InboundMessage::Ready);
    }

    #[test]
    fn test_decode_audio_part() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"aGVsbG8="}}
        ]}}}"#;
        match decode_inbound(raw).unwrap() {
            InboundMessage::Audio(packet) => {
                assert_eq!(packet.sample_rate(), Some(24_000));
                assert_eq!(packet.to_bytes().unwrap(), b"hello");
            }
            other => panic!("Expected Audio, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_interrupted_takes_priority_over_parts() {
        let raw = r#"{"serverContent":{"interrupted":true,"modelTurn":{"parts":[]}}}"#;
        assert_eq!(decode_inbound(raw).unwrap(), InboundMessage::Interrupted);
    }

    #[test]
    fn test_decode_turn_complete() {
        let raw = r#"{"serverContent":{"turnComplete":true}}"#;
        assert_eq!(decode_inbound(raw).unwrap(), InboundMessage::TurnComplete);
    }

    #[test]
    fn test_decode_tool_call() {
        let raw = r#"{"toolCall":{"functionCalls":[
            {"id":"fc-1","name":"open_app","args":{"app_name":"spotify"}}
        ]}}"#;
        match decode_inbound(raw).unwrap() {
            InboundMessage::ToolCall(inv) => {
                assert_eq!(inv.correlation_id, "fc-1");
                assert_eq!(inv.name, "open_app");
                assert_eq!(inv.arguments["app_name"], "spotify");
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_shape_is_tolerated() {
        assert_eq!(decode_inbound(r#"{"usageMetadata":{"tokens":3}}"#).unwrap(), InboundMessage::Unknown);
    }

    #[test]
    fn test_decode_garbage_is_protocol_violation() {
        assert!(matches!(decode_inbound("not json"), Err(VoiceError::Protocol(_))));
    }
}
