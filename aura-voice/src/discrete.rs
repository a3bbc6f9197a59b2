//! Discrete voice loop, the fallback when duplex streaming is unavailable.
//!
//! Instead of streaming raw audio both ways, the loop runs one full
//! recognize → complete → synthesize cycle per turn:
//! `Listening → Thinking → Speaking → Listening`. Recognition is driven by
//! the state machine — it is re-armed after every synthesis, and it is never
//! armed while the assistant is thinking or speaking, so the assistant
//! cannot hear itself.
//!
//! Muting is applied at the loop layer: the recognizer keeps running and
//! recognized utterances are discarded, which preserves utterance boundaries
//! across a mute toggle. Reasoning markup is stripped before synthesis; the
//! raw reply is only ever logged.

use crate::error::{DeviceError, Result, VoiceError};
use async_trait::async_trait;
use aura_chat::ChatSession;
use aura_core::TranscriptTurn;
use aura_core::markup::strip_spoken_markup;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Spoken when a completion turn fails; the call itself survives.
pub const FALLBACK_UTTERANCE: &str =
    "Sorry, I lost my train of thought for a second. Could you say that again?";

/// Discrete loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// One-shot speech recognition.
///
/// `recognize_once` arms the recognizer and resolves with a single
/// finalized utterance — never interim results. The loop decides when to
/// arm it again.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether recognition exists on this platform at all. When `false`,
    /// a discrete call cannot start.
    fn is_supported(&self) -> bool {
        true
    }

    /// Await the next finalized utterance.
    async fn recognize_once(&self) -> Result<String>;
}

/// Text-to-speech playback. Resolves when the utterance has finished
/// playing, which is what re-arms recognition.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}

struct DiscreteCore {
    session: tokio::sync::Mutex<ChatSession>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    state: Mutex<LoopState>,
    muted: AtomicBool,
    generation: AtomicU64,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DiscreteCore {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, generation: u64, state: LoopState) -> bool {
        let mut current = self.state.lock();
        if !self.is_current(generation) {
            return false;
        }
        *current = state;
        true
    }
}

/// A voice call in discrete fallback mode.
pub struct DiscreteCall {
    core: Arc<DiscreteCore>,
}

impl DiscreteCall {
    pub fn new(
        session: ChatSession,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            core: Arc::new(DiscreteCore {
                session: tokio::sync::Mutex::new(session),
                recognizer,
                synthesizer,
                state: Mutex::new(LoopState::Idle),
                muted: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start the loop. Fails with [`DeviceError::PlatformUnsupported`] when
    /// no recognizer exists — a discrete call cannot run without one.
    pub fn open(&self) -> Result<()> {
        let core = &self.core;
        if !core.recognizer.is_supported() {
            return Err(DeviceError::PlatformUnsupported.into());
        }
        {
            let state = core.state.lock();
            if *state != LoopState::Idle {
                return Err(VoiceError::config("Call already running"));
            }
        }

        let generation = core.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(run_loop(Arc::clone(core), generation));
        *core.task.lock() = Some(handle);
        tracing::info!(generation, "Discrete voice loop started");
        Ok(())
    }

    /// End the call. Synchronous: the state flips to `Idle` immediately and
    /// any in-flight recognition or synthesis is abandoned. Idempotent.
    pub fn close(&self) {
        self.core.generation.fetch_add(1, Ordering::SeqCst);
        *self.core.state.lock() = LoopState::Idle;
        if let Some(task) = self.core.task.lock().take() {
            task.abort();
        }
    }

    /// End and restart the loop, keeping the conversation history.
    pub fn retry(&self) -> Result<()> {
        self.close();
        self.open()
    }

    pub fn state(&self) -> LoopState {
        *self.core.state.lock()
    }

    /// While muted, recognized utterances are discarded and the loop stays
    /// in `Listening`; recognition itself keeps running.
    pub fn set_muted(&self, muted: bool) {
        self.core.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.core.muted.load(Ordering::SeqCst)
    }

    /// Snapshot of the rolling conversation window, for persistence.
    pub async fn history(&self) -> Vec<TranscriptTurn> {
        self.core.session.lock().await.history().to_vec()
    }
}

async fn run_loop(core: Arc<DiscreteCore>, generation: u64) {
    loop {
        if !core.set_state(generation, LoopState::Listening) {
            break;
        }

        let heard = match core.recognizer.recognize_once().await {
            Ok(text) => text,
            Err(e) => {
                // Recognition died out from under the call; that ends it.
                if core.is_current(generation) {
                    tracing::error!(error = %e, "Recognizer failed, ending call");
                    core.generation.fetch_add(1, Ordering::SeqCst);
                    *core.state.lock() = LoopState::Idle;
                }
                break;
            }
        };
        if !core.is_current(generation) {
            break;
        }

        let heard = heard.trim();
        if heard.is_empty() {
            continue;
        }
        if core.muted.load(Ordering::SeqCst) {
            tracing::debug!("Muted: recognized utterance discarded");
            continue;
        }

        if !core.set_state(generation, LoopState::Thinking) {
            break;
        }
        tracing::debug!(utterance = %heard, "Completing turn");
        let outcome = core.session.lock().await.send(heard).await;
        if !core.is_current(generation) {
            break;
        }

        let spoken = match outcome {
            Ok(outcome) => {
                tracing::debug!(raw = %outcome.text, "Completion reply");
                strip_spoken_markup(&outcome.text)
            }
            Err(e) => {
                // A single failed turn never ends the call.
                tracing::warn!(error = %e, "Completion turn failed, speaking fallback");
                FALLBACK_UTTERANCE.to_string()
            }
        };

        if !core.set_state(generation, LoopState::Speaking) {
            break;
        }
        if let Err(e) = core.synthesizer.speak(&spoken).await {
            tracing::warn!(error = %e, "Synthesis failed");
        }
        // Loop back to Listening: recognition is re-armed by this state
        // machine, never left to restart on its own.
    }
    tracing::debug!(generation, "Discrete voice loop ended");
}
