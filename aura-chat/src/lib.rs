//! # aura-chat
//!
//! Discrete (non-streaming) completion client for the Aura companion.
//!
//! This crate talks to any OpenAI-compatible `chat/completions` endpoint
//! and wraps it in a rolling-window [`ChatSession`] that the text UI and
//! the voice fallback loop both drive. It also carries the built-in tool
//! declarations (`open_app`, `send_sms`) and the app directory the default
//! tool broker resolves against.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aura_chat::{ChatSession, OpenAiChatModel};
//! use aura_core::{ChatMode, PersonaPhase, system_prompt};
//!
//! let model = OpenAiChatModel::new("https://api.deepseek.com", api_key, "deepseek-reasoner")?;
//! let mut session = ChatSession::new(
//!     std::sync::Arc::new(model),
//!     system_prompt(ChatMode::Personal, PersonaPhase::Intro),
//! );
//! let outcome = session.send("good morning!").await?;
//! println!("{}", outcome.text);
//! ```

pub mod error;
pub mod model;
pub mod openai;
pub mod session;
pub mod tools;

pub use error::{ChatError, Result};
pub use model::{ChatModel, ChatReply, ChatRequest};
pub use openai::OpenAiChatModel;
pub use session::{ChatOutcome, ChatSession, HISTORY_WINDOW_TURNS};
pub use tools::{AppDirectoryBroker, app_url, builtin_tools, open_app_tool, send_sms_tool};
