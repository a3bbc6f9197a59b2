//! PCM wire codec.
//!
//! The duplex endpoint speaks base64-encoded 16-bit little-endian PCM with
//! the sample rate carried in the mime tag (`audio/pcm;rate=16000`). These
//! conversions are pure: no device handles, no state, and no failure mode
//! for finite input. Encoding quantizes to i16, so a round trip through
//! [`encode_frame`]/[`decode_packet`] reconstructs samples to within
//! 1/32768 of the originals rather than exactly.

use crate::error::{Result, VoiceError};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Capture-side sample rate.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Playback-side sample rate used by the remote model's audio output.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

const I16_SCALE: f32 = 32_768.0;

/// A media payload on the duplex wire: base64 data plus a mime tag carrying
/// the codec and sample rate. This shape is stable; the screen-share side
/// channel reuses it with an image mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAudioPacket {
    /// Base64-encoded payload bytes.
    pub data: String,
    /// Codec tag, e.g. `audio/pcm;rate=24000` or `image/jpeg`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl WireAudioPacket {
    /// Wrap raw payload bytes under a mime tag.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Decode the base64 payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| VoiceError::protocol(format!("Invalid base64 payload: {e}")))
    }

    /// Parse the `rate=<N>` parameter of the mime tag, if present.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }

    /// Whether the payload is PCM audio (as opposed to an auxiliary frame).
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/pcm")
    }
}

/// The PCM mime tag for a sample rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Convert normalized f32 samples to 16-bit little-endian bytes.
///
/// Values are scaled by 32768, rounded, and clamped to the i16 range, so
/// out-of-range input degrades to full-scale rather than wrapping.
pub fn samples_to_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian bytes back to normalized f32 samples.
///
/// A trailing odd byte (torn packet) is dropped rather than rejected; the
/// transport layer decides whether a malformed packet is worth logging.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE)
        .collect()
}

/// A decoded inbound audio payload, ready for the playback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Normalized mono samples.
    pub samples: Vec<f32>,
    /// Sample rate from the packet's mime tag.
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Audible duration of this payload.
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Encode one captured frame for transmission.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> WireAudioPacket {
    WireAudioPacket::from_bytes(&samples_to_bytes(samples), pcm_mime_type(sample_rate))
}

/// Decode an inbound packet. The mime rate falls back to the model's
/// output rate when the tag omits it.
pub fn decode_packet(packet: &WireAudioPacket) -> Result<DecodedAudio> {
    let bytes = packet.to_bytes()?;
    Ok(DecodedAudio {
        samples: bytes_to_samples(&bytes),
        sample_rate: packet.sample_rate().unwrap_or(OUTPUT_SAMPLE_RATE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_within_quantization_bound() {
        let samples = vec![0.0, 0.25, -0.25, 0.9999, -1.0, 0.001, -0.001];
        let decoded = decode_packet(&encode_frame(&samples, INPUT_SAMPLE_RATE)).unwrap();

        assert_eq!(decoded.samples.len(), samples.len());
        assert_eq!(decoded.sample_rate, INPUT_SAMPLE_RATE);
        for (original, recovered) in samples.iter().zip(&decoded.samples) {
            assert!(
                (original - recovered).abs() <= 1.0 / I16_SCALE,
                "sample {original} decoded as {recovered}"
            );
        }
    }

    #[test]
    fn test_empty_input_roundtrips_to_empty() {
        let packet = encode_frame(&[], INPUT_SAMPLE_RATE);
        assert!(packet.data.is_empty());
        let decoded = decode_packet(&packet).unwrap();
        assert!(decoded.samples.is_empty());
    }

    #[test]
    fn test_out_of_range_samples_clamp() {
        let bytes = samples_to_bytes(&[2.0, -2.0]);
        let samples = bytes_to_samples(&bytes);
        assert!((samples[0] - (i16::MAX as f32 / I16_SCALE)).abs() < 1e-6);
        assert!((samples[1] - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_mime_tag_rate_parsing() {
        assert_eq!(pcm_mime_type(16_000), "audio/pcm;rate=16000");

        let packet = WireAudioPacket { data: String::new(), mime_type: "audio/pcm;rate=24000".into() };
        assert_eq!(packet.sample_rate(), Some(24_000));
        assert!(packet.is_audio());

        let untagged = WireAudioPacket { data: String::new(), mime_type: "audio/pcm".into() };
        assert_eq!(untagged.sample_rate(), None);
        assert_eq!(decode_packet(&untagged).unwrap().sample_rate, OUTPUT_SAMPLE_RATE);
    }

    #[test]
    fn test_wire_serde_field_names() {
        let packet = encode_frame(&[0.5], 16_000);
        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"mimeType\":\"audio/pcm;rate=16000\""));
        assert!(json.contains("\"data\""));
    }

    #[test]
    fn test_invalid_base64_is_protocol_error() {
        let packet = WireAudioPacket { data: "!!!".into(), mime_type: pcm_mime_type(24_000) };
        assert!(matches!(decode_packet(&packet), Err(VoiceError::Protocol(_))));
    }

    #[test]
    fn test_torn_packet_drops_trailing_byte() {
        let samples = bytes_to_samples(&[0x00, 0x40, 0x7f]);
        assert_eq!(samples.len(), 1);
    }
}
