//! Session mode selection.
//!
//! A deployment either has a duplex audio endpoint or it does not; the
//! selector picks the mode once, constructs the matching call behind the
//! common [`VoiceCall`] interface, and enforces that at most one call is
//! active at a time — the previous handle is always torn down before a new
//! one may open, so device handles cannot double up.

use crate::discrete::{DiscreteCall, LoopState};
use crate::error::Result;
use crate::live::{LiveCall, SessionState, SessionStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Which session implementation a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Duplex audio streaming against a realtime endpoint.
    Streaming,
    /// Recognize → complete → synthesize, one turn at a time.
    Discrete,
}

impl CallMode {
    /// Pick the mode for a deployment's capabilities.
    pub fn for_capabilities(duplex_supported: bool) -> Self {
        if duplex_supported { Self::Streaming } else { Self::Discrete }
    }
}

/// The common surface of both call implementations.
#[async_trait]
pub trait VoiceCall: Send + Sync {
    fn mode(&self) -> CallMode;

    /// Establish the call. Errors carry the full taxonomy: device,
    /// transport and unsupported-platform causes stay distinguishable.
    async fn open(&self) -> Result<()>;

    /// Hang up. Synchronous, idempotent, safe from any state.
    fn close(&self);

    /// Tear down and reopen with the same configuration.
    async fn retry(&self) -> Result<()>;

    fn status(&self) -> SessionStatus;

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;
}

#[async_trait]
impl VoiceCall for LiveCall {
    fn mode(&self) -> CallMode {
        CallMode::Streaming
    }

    async fn open(&self) -> Result<()> {
        LiveCall::open(self).await
    }

    fn close(&self) {
        LiveCall::close(self);
    }

    async fn retry(&self) -> Result<()> {
        LiveCall::retry(self).await
    }

    fn status(&self) -> SessionStatus {
        LiveCall::status(self)
    }

    fn set_muted(&self, muted: bool) {
        LiveCall::set_muted(self, muted);
    }

    fn is_muted(&self) -> bool {
        LiveCall::is_muted(self)
    }
}

#[async_trait]
impl VoiceCall for DiscreteCall {
    fn mode(&self) -> CallMode {
        CallMode::Discrete
    }

    async fn open(&self) -> Result<()> {
        DiscreteCall::open(self)
    }

    fn close(&self) {
        DiscreteCall::close(self);
    }

    async fn retry(&self) -> Result<()> {
        DiscreteCall::retry(self)
    }

    fn status(&self) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            state: match state {
                LoopState::Idle => SessionState::Idle,
                LoopState::Listening | LoopState::Thinking | LoopState::Speaking => {
                    SessionState::Open
                }
            },
            speaking: state == LoopState::Speaking,
        }
    }

    fn set_muted(&self, muted: bool) {
        DiscreteCall::set_muted(self, muted);
    }

    fn is_muted(&self) -> bool {
        DiscreteCall::is_muted(self)
    }
}

/// Owns the single active call slot.
#[derive(Default)]
pub struct SessionSelector {
    active: tokio::sync::Mutex<Option<Arc<dyn VoiceCall>>>,
}

impl SessionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear down whatever call is active, then open `call` and make it the
    /// active one. The slot lock is held across the open, so two racing
    /// activations serialize: the loser tears down the winner's call
    /// before opening its own.
    pub async fn activate(&self, call: Arc<dyn VoiceCall>) -> Result<Arc<dyn VoiceCall>> {
        let mut slot = self.active.lock().await;
        if let Some(previous) = slot.take() {
            tracing::info!("Tearing down previous call before activating new one");
            previous.close();
        }
        call.open().await?;
        *slot = Some(Arc::clone(&call));
        Ok(call)
    }

    /// The currently active call, if any.
    pub async fn active(&self) -> Option<Arc<dyn VoiceCall>> {
        self.active.lock().await.clone()
    }

    /// End the active call, leaving the slot empty.
    pub async fn end_call(&self) {
        if let Some(call) = self.active.lock().await.take() {
            call.close();
        }
    }
}
