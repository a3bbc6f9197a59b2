//! Error types for the voice engine.

use thiserror::Error;

/// Result type for voice operations.
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Device acquisition failures.
///
/// Each subtype carries its own actionable message: the caller surfaces
/// these verbatim and offers a retry affordance, so a generic "something
/// went wrong" is never acceptable here.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The platform refused access to the device.
    #[error("Device access denied — grant microphone/screen permission and retry")]
    PermissionDenied,

    /// No matching device is present.
    #[error("No audio device found — connect a microphone or speaker and retry")]
    HardwareMissing,

    /// Another process holds the device exclusively.
    #[error("Audio device is busy — close the application using it and retry")]
    HardwareBusy,

    /// The capability is missing entirely on this platform.
    #[error("Audio capture is not supported on this platform")]
    PlatformUnsupported,
}

impl DeviceError {
    /// Best-effort classification of backend-specific error text. Platform
    /// backends (ALSA, CoreAudio, WASAPI) only expose these causes as
    /// strings, so the match is on well-known phrasings; anything
    /// unrecognized maps to `fallback`.
    pub fn classify_description(description: &str, fallback: DeviceError) -> DeviceError {
        let lower = description.to_ascii_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
            DeviceError::PermissionDenied
        } else if lower.contains("busy") || lower.contains("in use") {
            DeviceError::HardwareBusy
        } else if lower.contains("no device") || lower.contains("not found") {
            DeviceError::HardwareMissing
        } else {
            fallback
        }
    }
}

/// Errors that can occur during voice sessions.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// A required device could not be acquired.
    #[error("Device unavailable: {0}")]
    Device(#[from] DeviceError),

    /// Missing or rejected credential on the remote transport.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// The remote endpoint refused or dropped the connection.
    #[error("Remote endpoint unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote endpoint could not be reached at all.
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Unexpected message shape from the remote. Logged and skipped by the
    /// session; fatal only if repeated.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A single completion/tool round failed; the session stays alive.
    #[error("Turn failed: {0}")]
    RecoverableTurn(String),

    /// Operation raced with session teardown.
    #[error("Session closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VoiceError {
    /// Create a protocol violation error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a remote-unavailable error.
    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    /// Whether this error came from local device acquisition (as opposed
    /// to the remote transport or the runtime).
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }

    /// Whether this error came from the remote transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::AuthFailure(_) | Self::RemoteUnavailable(_) | Self::NetworkUnreachable(_)
        )
    }
}
