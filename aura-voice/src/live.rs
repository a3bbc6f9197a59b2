//! Duplex streaming call orchestration.
//!
//! [`LiveCall`] ties the capture pipeline, codec, transport and playback
//! scheduler together: captured frames are encoded and sent while inbound
//! messages are dispatched to the scheduler, the tool broker or the barge-in
//! path. Lifecycle follows `Idle → Connecting → Open → Closed`, with `Error`
//! reachable from any non-terminal state.
//!
//! Every open attempt gets a generation number, and the continuation of
//! every suspension point (connect, send, broker call) re-checks it before
//! touching shared state. A `close()` racing an in-flight operation bumps
//! the generation, leaving the stale continuation inert — hanging up can
//! never produce ghost playback.

use crate::capture::{CaptureConfig, CaptureHandle, CaptureSource, CaptureStop, Microphone};
use crate::codec::{WireAudioPacket, decode_packet, encode_frame};
use crate::config::CallConfig;
use crate::error::{Result, VoiceError};
use crate::events::{InboundMessage, OutboundMessage};
use crate::playback::{OutputSink, PlaybackScheduler, RodioSink, TokioClock};
use crate::transport::{DuplexConnector, DuplexTransport};
use aura_core::{ToolBroker, ToolOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Consecutive unparseable messages tolerated before the session gives up.
const MAX_PROTOCOL_STRIKES: u32 = 5;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

/// A snapshot of the session for the caller's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Whether model audio is pending or audible right now.
    pub speaking: bool,
}

/// Acquires the audio devices for one call attempt.
///
/// A seam over [`Microphone`]/[`RodioSink`] so sessions run against fakes in
/// tests. Exactly one capture and one output device are held per active
/// call; both are released by teardown.
pub trait DeviceProvider: Send + Sync {
    fn open_capture(&self, config: &CaptureConfig) -> Result<CaptureHandle>;
    fn open_playback(&self) -> Result<Arc<dyn OutputSink>>;
}

/// The machine's real microphone and speaker.
pub struct SystemDevices;

impl DeviceProvider for SystemDevices {
    fn open_capture(&self, config: &CaptureConfig) -> Result<CaptureHandle> {
        Microphone.start(config)
    }

    fn open_playback(&self) -> Result<Arc<dyn OutputSink>> {
        Ok(Arc::new(RodioSink::open()?))
    }
}

/// Auxiliary input feed into an open session, used by the screen-share
/// side channel. Capacity one, offer-don't-queue: a frame is dropped when
/// the previous one has not been sent yet, so the audio cadence is never
/// delayed by image payloads.
#[derive(Clone)]
pub struct AuxFeed {
    tx: mpsc::Sender<WireAudioPacket>,
}

impl AuxFeed {
    /// Build a feed over an existing channel. Open sessions hand out their
    /// own feed via [`LiveCall::aux_feed`]; this is for wiring a producer
    /// to a custom sink.
    pub fn from_sender(tx: mpsc::Sender<WireAudioPacket>) -> Self {
        Self { tx }
    }

    /// Offer a frame without waiting. Returns `false` when the frame was
    /// dropped (previous send still in flight) or the session has ended.
    pub fn offer(&self, packet: WireAudioPacket) -> bool {
        self.tx.try_send(packet).is_ok()
    }

    /// Whether the session behind this feed is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── Internals ───────────────────────────────────────────────────────────

/// Resources of one established call attempt. Teardown runs exactly once
/// no matter how many paths race into it.
struct ActiveCall {
    session_id: String,
    generation: u64,
    transport: Arc<dyn DuplexTransport>,
    scheduler: Arc<PlaybackScheduler>,
    capture_stop: CaptureStop,
    torn_down: AtomicBool,
}

impl ActiveCall {
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.capture_stop.stop();
        self.scheduler.teardown();
        let transport = Arc::clone(&self.transport);
        spawn_detached(async move { transport.close().await });
        tracing::info!(session_id = %self.session_id, "Voice session torn down");
    }
}

struct LiveState {
    phase: SessionState,
    active: Option<Arc<ActiveCall>>,
    aux: Option<AuxFeed>,
}

struct LiveCore {
    config: CallConfig,
    connector: Arc<dyn DuplexConnector>,
    devices: Arc<dyn DeviceProvider>,
    broker: Arc<dyn ToolBroker>,
    state: Mutex<LiveState>,
    /// Bumped by every open attempt and every close. Continuations compare
    /// against the value they captured; a mismatch means they are stale.
    generation: AtomicU64,
    muted: AtomicBool,
}

impl LiveCore {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// End the session from inside a pump task. No-op if the attempt has
    /// already been superseded.
    fn finish(&self, active: &Arc<ActiveCall>, outcome: SessionState, cause: Option<&VoiceError>) {
        let mut state = self.state.lock();
        let current = state
            .active
            .as_ref()
            .is_some_and(|a| a.generation == active.generation);
        if !current {
            return;
        }
        state.active = None;
        state.aux = None;
        state.phase = outcome;
        drop(state);

        self.generation.fetch_add(1, Ordering::SeqCst);
        active.teardown();
        match cause {
            Some(error) => {
                tracing::error!(%error, "Voice session failed");
            }
            None => tracing::info!("Voice session closed by remote"),
        }
    }
}

/// One duplex voice call. Owned by the caller; all methods take `&self`,
/// so the handle can be shared with UI code behind an `Arc`.
pub struct LiveCall {
    core: Arc<LiveCore>,
}

impl LiveCall {
    pub fn new(
        config: CallConfig,
        connector: Arc<dyn DuplexConnector>,
        devices: Arc<dyn DeviceProvider>,
        broker: Arc<dyn ToolBroker>,
    ) -> Self {
        Self {
            core: Arc::new(LiveCore {
                config,
                connector,
                devices,
                broker,
                state: Mutex::new(LiveState {
                    phase: SessionState::Idle,
                    active: None,
                    aux: None,
                }),
                generation: AtomicU64::new(0),
                muted: AtomicBool::new(false),
            }),
        }
    }

    /// Connect the transport and wire the audio pipeline.
    ///
    /// On failure the specific cause is surfaced: a [`VoiceError::Device`]
    /// means the microphone or speaker, a transport variant means the
    /// remote endpoint. `close()` during the attempt cancels it.
    pub async fn open(&self) -> Result<()> {
        let core = &self.core;
        let generation = {
            let mut state = core.state.lock();
            if matches!(state.phase, SessionState::Connecting | SessionState::Open) {
                return Err(VoiceError::config("Session already open"));
            }
            state.phase = SessionState::Connecting;
            core.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        tracing::info!(generation, "Opening voice session");

        match self.establish(generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut state = core.state.lock();
                if core.is_current(generation) {
                    state.phase = if matches!(e, VoiceError::SessionClosed) {
                        SessionState::Closed
                    } else {
                        SessionState::Error
                    };
                }
                Err(e)
            }
        }
    }

    async fn establish(&self, generation: u64) -> Result<()> {
        let core = Arc::clone(&self.core);
        let transport = core.connector.connect(&core.config).await?;

        // The connect may have raced a close(); a stale continuation must
        // not go on to acquire devices.
        if !core.is_current(generation) {
            close_transport(transport);
            return Err(VoiceError::SessionClosed);
        }

        let capture_config = CaptureConfig {
            sample_rate: core.config.input_sample_rate,
            ..CaptureConfig::default()
        };
        let mut capture = match core.devices.open_capture(&capture_config) {
            Ok(capture) => capture,
            Err(e) => {
                close_transport(transport);
                return Err(e);
            }
        };
        let sink = match core.devices.open_playback() {
            Ok(sink) => sink,
            Err(e) => {
                capture.stop();
                close_transport(transport);
                return Err(e);
            }
        };
        let scheduler = Arc::new(PlaybackScheduler::new(sink, Arc::new(TokioClock::new())));

        let (aux_tx, aux_rx) = mpsc::channel(1);
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "Voice session established");
        let active = Arc::new(ActiveCall {
            session_id,
            generation,
            transport,
            scheduler,
            capture_stop: capture.stop_handle(),
            torn_down: AtomicBool::new(false),
        });

        {
            let mut state = core.state.lock();
            if !core.is_current(generation) {
                drop(state);
                capture.stop();
                active.teardown();
                return Err(VoiceError::SessionClosed);
            }
            state.phase = SessionState::Open;
            state.active = Some(Arc::clone(&active));
            state.aux = Some(AuxFeed { tx: aux_tx });
        }

        tokio::spawn(send_pump(Arc::clone(&core), Arc::clone(&active), capture));
        tokio::spawn(aux_pump(Arc::clone(&core), Arc::clone(&active), aux_rx));
        tokio::spawn(receive_loop(core, active));
        Ok(())
    }

    /// Hang up. Takes effect synchronously: the state flips, every stale
    /// continuation is invalidated, and device teardown is kicked off.
    /// Safe from any state, including mid-connect, and idempotent.
    pub fn close(&self) {
        self.core.generation.fetch_add(1, Ordering::SeqCst);
        let active = {
            let mut state = self.core.state.lock();
            state.phase = SessionState::Closed;
            state.aux = None;
            state.active.take()
        };
        if let Some(active) = active {
            active.teardown();
        }
    }

    /// Tear down and reopen with the same configuration. The previous
    /// attempt's devices are released before the new one acquires its own.
    pub async fn retry(&self) -> Result<()> {
        self.close();
        self.open().await
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.core.state.lock();
        let speaking = state
            .active
            .as_ref()
            .is_some_and(|a| a.scheduler.is_speaking());
        SessionStatus { state: state.phase, speaking }
    }

    /// The established session's id, for log correlation. `None` until the
    /// session is open.
    pub fn session_id(&self) -> Option<String> {
        self.core.state.lock().active.as_ref().map(|a| a.session_id.clone())
    }

    /// While muted, captured frames are discarded before encoding; capture
    /// itself keeps running so unmuting is instant.
    pub fn set_muted(&self, muted: bool) {
        self.core.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.core.muted.load(Ordering::SeqCst)
    }

    /// Feed for auxiliary frames (screen share). `None` until the session
    /// is open; the feed dies with the session.
    pub fn aux_feed(&self) -> Option<AuxFeed> {
        self.core.state.lock().aux.clone()
    }
}

// ── Pump tasks ──────────────────────────────────────────────────────────

/// Capture → encode → transport. Ends when capture stops, the session is
/// superseded, or the transport fails.
async fn send_pump(core: Arc<LiveCore>, active: Arc<ActiveCall>, mut capture: CaptureHandle) {
    let sample_rate = core.config.input_sample_rate;
    while let Some(frame) = capture.next_frame().await {
        if !core.is_current(active.generation) {
            break;
        }
        if core.muted.load(Ordering::SeqCst) {
            continue;
        }
        let packet = encode_frame(&frame, sample_rate);
        if let Err(e) = active.transport.send(&OutboundMessage::Media(packet)).await {
            core.finish(&active, SessionState::Error, Some(&e));
            break;
        }
    }
    tracing::debug!(generation = active.generation, "Send pump ended");
}

/// Auxiliary frames (screen share) ride the same transport but never the
/// same queue position as a pending audio frame: the feed holds at most one
/// frame and producers drop rather than wait.
async fn aux_pump(
    core: Arc<LiveCore>,
    active: Arc<ActiveCall>,
    mut aux_rx: mpsc::Receiver<WireAudioPacket>,
) {
    while let Some(packet) = aux_rx.recv().await {
        if !core.is_current(active.generation) {
            break;
        }
        if let Err(e) = active.transport.send(&OutboundMessage::Media(packet)).await {
            core.finish(&active, SessionState::Error, Some(&e));
            break;
        }
    }
}

/// Transport → dispatch. Audio goes to the scheduler, tool calls to the
/// broker (the outcome is sent back before any further message is read),
/// interruption to the barge-in path.
async fn receive_loop(core: Arc<LiveCore>, active: Arc<ActiveCall>) {
    let mut strikes = 0u32;
    loop {
        let message = active.transport.next().await;
        if !core.is_current(active.generation) {
            break;
        }
        match message {
            Some(Ok(InboundMessage::Audio(packet))) => match decode_packet(&packet) {
                Ok(audio) => {
                    strikes = 0;
                    if active.scheduler.enqueue(audio).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Undecodable audio payload skipped");
                    strikes += 1;
                }
            },
            Some(Ok(InboundMessage::ToolCall(invocation))) => {
                strikes = 0;
                tracing::debug!(tool = %invocation.name, id = %invocation.correlation_id, "Tool invocation");
                let result = core.broker.execute(&invocation).await;
                if !core.is_current(active.generation) {
                    break;
                }
                let outcome = ToolOutcome::for_invocation(&invocation, result);
                if let Err(e) = active
                    .transport
                    .send(&OutboundMessage::ToolOutcome(outcome))
                    .await
                {
                    core.finish(&active, SessionState::Error, Some(&e));
                    break;
                }
            }
            Some(Ok(InboundMessage::Interrupted)) => {
                strikes = 0;
                tracing::debug!("Barge-in: clearing playback");
                active.scheduler.interrupt();
            }
            Some(Ok(InboundMessage::TurnComplete | InboundMessage::Ready)) => {
                strikes = 0;
            }
            Some(Ok(InboundMessage::Unknown)) => {
                tracing::debug!("Unrecognized server message skipped");
            }
            Some(Err(e @ VoiceError::Protocol(_))) => {
                tracing::warn!(error = %e, "Protocol violation skipped");
                strikes += 1;
            }
            Some(Err(e)) => {
                core.finish(&active, SessionState::Error, Some(&e));
                break;
            }
            None => {
                core.finish(&active, SessionState::Closed, None);
                break;
            }
        }

        if strikes >= MAX_PROTOCOL_STRIKES {
            let error = VoiceError::protocol("Repeated malformed messages from remote");
            core.finish(&active, SessionState::Error, Some(&error));
            break;
        }
    }
    tracing::debug!(generation = active.generation, "Receive loop ended");
}

fn close_transport(transport: Arc<dyn DuplexTransport>) {
    spawn_detached(async move { transport.close().await });
}

/// Spawn teardown work when a runtime is available; teardown paths must
/// stay synchronous and panic-free from the caller's perspective.
fn spawn_detached<F>(future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(future);
    }
}
