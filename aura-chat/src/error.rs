//! Error types for the completion client.

use thiserror::Error;

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while talking to the completion endpoint.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or rejected credential.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// The endpoint answered with a server-side failure.
    #[error("Remote endpoint unavailable: {status} - {message}")]
    RemoteUnavailable {
        /// HTTP-status-like code from the endpoint.
        status: u16,
        /// Error message from the endpoint.
        message: String,
    },

    /// The endpoint could not be reached at all.
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Response did not match the expected shape.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    /// Create a protocol violation error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a single automatic retry is worth attempting. Auth and
    /// validation failures are surfaced verbatim instead.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkUnreachable(_) => true,
            Self::RemoteUnavailable { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
