//! # aura-voice
//!
//! The real-time voice session engine of the Aura companion.
//!
//! A voice call is a duplex audio stream against a remote model: microphone
//! frames go out encoded as base64 PCM, model audio comes back and is
//! scheduled gaplessly on the output clock, and barge-in cuts playback off
//! mid-word. When a deployment has no duplex endpoint, the same call
//! surface runs a discrete recognize → complete → synthesize loop instead.
//!
//! ## Layout
//!
//! - [`codec`] — pure PCM ⇄ wire conversions.
//! - [`playback`] — the gapless playback scheduler and output sink.
//! - [`capture`] — microphone framing over the input device.
//! - [`events`]/[`transport`] — the duplex wire protocol and its WebSocket
//!   transport.
//! - [`live`] — the streaming session orchestrator.
//! - [`discrete`]/[`synth`] — the fallback loop and its synthesizer.
//! - [`screenshare`] — the 1 Hz auxiliary frame sampler.
//! - [`selector`] — one active call, in the right mode, behind one trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aura_voice::{CallConfig, LiveCall, SessionSelector, SystemDevices, WsConnector};
//! use std::sync::Arc;
//!
//! let config = CallConfig::new()
//!     .with_system_prompt(prompt)
//!     .with_voice_profile("ember");
//! let call = Arc::new(LiveCall::new(
//!     config,
//!     Arc::new(WsConnector::from_endpoint(endpoint, api_key)?),
//!     Arc::new(SystemDevices),
//!     broker,
//! ));
//! let selector = SessionSelector::new();
//! selector.activate(call).await?;
//! ```

pub mod capture;
pub mod codec;
pub mod config;
pub mod discrete;
pub mod error;
pub mod events;
pub mod live;
pub mod playback;
pub mod screenshare;
pub mod selector;
pub mod synth;
pub mod transport;

pub use capture::{CaptureConfig, CaptureHandle, CaptureSource, CaptureStop, FRAME_SAMPLES, Microphone};
pub use codec::{
    DecodedAudio, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, WireAudioPacket, decode_packet,
    encode_frame,
};
pub use config::CallConfig;
pub use discrete::{
    DiscreteCall, FALLBACK_UTTERANCE, LoopState, SpeechRecognizer, SpeechSynthesizer,
};
pub use error::{DeviceError, Result, VoiceError};
pub use events::{InboundMessage, OutboundMessage};
pub use live::{AuxFeed, DeviceProvider, LiveCall, SessionState, SessionStatus, SystemDevices};
pub use playback::{AudioClock, OutputSink, PlaybackScheduler, RodioSink, TokioClock};
pub use screenshare::{FrameGrabber, PrimaryMonitor, ScreenShare};
pub use selector::{CallMode, SessionSelector, VoiceCall};
pub use synth::{ClipPlayer, HttpSynthesizer};
pub use transport::{DuplexConnector, DuplexTransport, WsConnector, WsTransport};
