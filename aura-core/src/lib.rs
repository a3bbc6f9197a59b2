//! # aura-core
//!
//! Shared foundations for the Aura voice companion: chat transcript types,
//! persona phase selection, reply markup post-processing, and the history
//! persistence contract with its in-memory and JSON-file implementations.
//!
//! The crates above this one consume these pieces through narrow seams:
//! `aura-chat` builds rolling conversations out of [`ChatMessage`] and
//! [`TranscriptTurn`], and `aura-voice` uses [`markup`] to clean model
//! output before it is spoken aloud.

pub mod error;
pub mod markup;
pub mod persona;
pub mod store;
pub mod tool;
pub mod types;

pub use error::{CoreError, Result};
pub use persona::{PersonaPhase, personal_phase, phase_for_history, system_prompt};
pub use store::{HistoryStore, JsonFileStore, MemoryStore, verify_login};
pub use tool::{FnToolBroker, ToolBroker, ToolDefinition, ToolInvocation, ToolOutcome};
pub use types::{
    CallDirection, CallLog, ChatMessage, ChatMode, Role, TranscriptTurn, UserProfile,
};
