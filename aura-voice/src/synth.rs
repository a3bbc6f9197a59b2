//! Speech synthesis for the discrete loop.
//!
//! The fallback loop needs whole rendered utterances, not a sample stream,
//! so synthesis is one HTTP round trip against an OpenAI-compatible
//! `audio/speech` endpoint followed by clip playback on the output device.
//! The device sits behind [`ClipPlayer`] so the client is testable without
//! a speaker.

use crate::discrete::SpeechSynthesizer;
use crate::error::{Result, VoiceError};
use crate::playback::RodioSink;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;

/// Plays one pre-rendered clip (WAV/MP3) to completion.
#[async_trait]
pub trait ClipPlayer: Send + Sync {
    async fn play_clip(&self, bytes: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl ClipPlayer for RodioSink {
    async fn play_clip(&self, bytes: Vec<u8>) -> Result<()> {
        self.play_encoded(bytes).await
    }
}

/// Synthesizer over an OpenAI-compatible `audio/speech` endpoint.
pub struct HttpSynthesizer {
    http: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
    model: String,
    voice: String,
    player: std::sync::Arc<dyn ClipPlayer>,
}

impl HttpSynthesizer {
    /// Create a synthesizer. `base_url` is the API root, e.g.
    /// `https://api.openai.com/v1` — the `audio/speech` path is appended.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        player: std::sync::Arc<dyn ClipPlayer>,
    ) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| VoiceError::config(format!("Invalid TTS base URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let endpoint = base
            .join("audio/speech")
            .map_err(|e| VoiceError::config(format!("Invalid TTS endpoint path: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            voice: voice.into(),
            player,
        })
    }

    async fn render(&self, text: &str) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    VoiceError::NetworkUnreachable(e.to_string())
                } else {
                    VoiceError::RecoverableTurn(format!("Synthesis request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(VoiceError::AuthFailure(format!(
                "Synthesis endpoint rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::RecoverableTurn(format!(
                "Synthesis endpoint returned {status}: {detail}"
            )));
        }

        Ok(response
            .bytes()
            .await
            .map_err(|e| VoiceError::RecoverableTurn(format!("Synthesis body read failed: {e}")))?
            .to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        tracing::debug!(chars = text.len(), voice = %self.voice, "Rendering speech");
        let clip = self.render(text).await?;
        self.player.play_clip(clip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingPlayer {
        clips: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl ClipPlayer for RecordingPlayer {
        async fn play_clip(&self, bytes: Vec<u8>) -> Result<()> {
            self.clips.lock().push(bytes);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_speak_posts_text_and_plays_the_clip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(bearer_token("tts-key"))
            .and(body_partial_json(json!({ "input": "hello there", "voice": "ember" })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let player = Arc::new(RecordingPlayer::default());
        let synth = HttpSynthesizer::new(
            &format!("{}/v1", server.uri()),
            "tts-key",
            "tts-1",
            "ember",
            player.clone(),
        )
        .unwrap();

        synth.speak("hello there").await.unwrap();
        assert_eq!(player.clips.lock().as_slice(), &[b"fake-mp3".to_vec()]);
    }

    #[tokio::test]
    async fn test_empty_text_skips_the_round_trip() {
        let player = Arc::new(RecordingPlayer::default());
        // No server: an accidental request would fail the test.
        let synth = HttpSynthesizer::new(
            "http://127.0.0.1:9",
            "key",
            "tts-1",
            "ember",
            player.clone(),
        )
        .unwrap();

        synth.speak("   ").await.unwrap();
        assert!(player.clips.lock().is_empty());
    }

    #[tokio::test]
    async fn test_auth_rejection_is_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let player = Arc::new(RecordingPlayer::default());
        let synth = HttpSynthesizer::new(
            &format!("{}/v1", server.uri()),
            "bad-key",
            "tts-1",
            "ember",
            player,
        )
        .unwrap();

        let err = synth.speak("hi").await.unwrap_err();
        assert!(matches!(err, VoiceError::AuthFailure(_)));
    }

    #[tokio::test]
    async fn test_server_failure_is_a_recoverable_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let player = Arc::new(RecordingPlayer::default());
        let synth = HttpSynthesizer::new(
            &format!("{}/v1", server.uri()),
            "key",
            "tts-1",
            "ember",
            player.clone(),
        )
        .unwrap();

        let err = synth.speak("hi").await.unwrap_err();
        assert!(matches!(err, VoiceError::RecoverableTurn(_)));
        assert!(player.clips.lock().is_empty());
    }
}
