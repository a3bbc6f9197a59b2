//! Transcript and account types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The model/companion.
    Assistant,
    /// Synthetic entries (call markers, notices).
    System,
}

/// Which conversation track a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Task-focused assistant track.
    Professional,
    /// Companion track with phased personas.
    Personal,
}

impl ChatMode {
    /// Stable key used by history stores.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Personal => "personal",
        }
    }
}

/// A single persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Message text. For call markers this is the human-readable summary.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Emoji reaction attached to this message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    /// True for call-log marker entries (excluded from persona phase counts).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_call_marker: bool,
    /// Call duration for marker entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_duration_secs: Option<u64>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            reaction: None,
            is_call_marker: false,
            call_duration_secs: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a call-end marker entry for the transcript.
    pub fn call_marker(duration_secs: u64) -> Self {
        let mut msg =
            Self::new(Role::System, format!("Voice call ended. Duration: {duration_secs}s"));
        msg.is_call_marker = true;
        msg.call_duration_secs = Some(duration_secs);
        msg
    }
}

/// Direction of a logged voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// One entry in a user's call history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    /// Unique log ID.
    pub id: String,
    /// Who initiated the call.
    pub direction: CallDirection,
    /// When the call started.
    pub started_at: DateTime<Utc>,
    /// Call length in seconds.
    pub duration_secs: u64,
}

impl CallLog {
    /// Create an outgoing call log entry starting now.
    pub fn outgoing(started_at: DateTime<Utc>, duration_secs: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: CallDirection::Outgoing,
            started_at,
            duration_secs,
        }
    }
}

/// A registered (or guest) user account. Login here is a stub: the password
/// is stored as provided and compared verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Email or phone acting as the account key.
    pub identity: String,
    /// Display name.
    pub full_name: String,
    /// Absent for guest accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserProfile {
    /// Create a guest profile with a random identity.
    pub fn guest() -> Self {
        Self {
            identity: format!("guest_{}", uuid::Uuid::new_v4().simple()),
            full_name: "Guest".to_string(),
            password: None,
        }
    }
}

/// One turn of the discrete voice loop's rolling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// `User` or `Assistant`; the window never holds `System` turns.
    pub role: Role,
    /// Turn text.
    pub text: String,
}

impl TranscriptTurn {
    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    /// Create an assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_keys_are_stable() {
        assert_eq!(ChatMode::Professional.key(), "professional");
        assert_eq!(ChatMode::Personal.key(), "personal");
    }

    #[test]
    fn test_call_marker_flags() {
        let msg = ChatMessage::call_marker(42);
        assert!(msg.is_call_marker);
        assert_eq!(msg.call_duration_secs, Some(42));
        assert_eq!(msg.role, Role::System);
    }

    #[test]
    fn test_message_serde_skips_empty_fields() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("reaction"));
        assert!(!json.contains("is_call_marker"));
    }

    #[test]
    fn test_guest_identities_are_unique() {
        let a = UserProfile::guest();
        let b = UserProfile::guest();
        assert_ne!(a.identity, b.identity);
        assert!(a.password.is_none());
    }
}
