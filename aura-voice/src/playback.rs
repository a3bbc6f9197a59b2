//! Gapless playback scheduling.
//!
//! Model audio arrives in bursts that are usually faster than real time, so
//! playback cannot simply follow arrival: each decoded chunk is scheduled on
//! an output clock at `max(now, end of the previous chunk)`, which yields
//! back-to-back playback with no gaps and no overlap. Barge-in calls
//! [`PlaybackScheduler::interrupt`], which drops every in-flight unit and
//! resets the clock cursor to "now".
//!
//! The audible device sits behind [`OutputSink`] so the scheduling logic is
//! testable without hardware; [`RodioSink`] is the production implementation,
//! running the `!Send` output stream on a dedicated thread.

use crate::codec::DecodedAudio;
use crate::error::{DeviceError, Result, VoiceError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ── Seams ───────────────────────────────────────────────────────────────

/// The audible output device.
pub trait OutputSink: Send + Sync {
    /// Queue samples for gapless playback after whatever is already queued.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Halt everything queued or audible right now.
    fn stop(&self);

    /// Release the device. Called exactly once, by scheduler teardown.
    fn release(&self);
}

/// Monotonic clock driving the schedule. The production clock is backed by
/// tokio time so paused-clock tests can steer it.
pub trait AudioClock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Clock over `tokio::time::Instant`.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { origin: tokio::time::Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ── Scheduler ───────────────────────────────────────────────────────────

struct SchedulerState {
    next_start: Duration,
    next_unit_id: u64,
    inflight: HashMap<u64, tokio::task::JoinHandle<()>>,
}

/// Orders decoded audio onto the output clock.
pub struct PlaybackScheduler {
    sink: Arc<dyn OutputSink>,
    clock: Arc<dyn AudioClock>,
    state: Arc<Mutex<SchedulerState>>,
    torn_down: AtomicBool,
}

impl PlaybackScheduler {
    /// Create a scheduler over an already-acquired sink.
    pub fn new(sink: Arc<dyn OutputSink>, clock: Arc<dyn AudioClock>) -> Self {
        let next_start = clock.now();
        Self {
            sink,
            clock,
            state: Arc::new(Mutex::new(SchedulerState {
                next_start,
                next_unit_id: 0,
                inflight: HashMap::new(),
            })),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Acquire the default output device and build a scheduler on it.
    ///
    /// Fails with a [`DeviceError`] when no output device can be opened;
    /// callers surface that as a session-level connection failure.
    pub fn open_default() -> Result<Self> {
        let sink = RodioSink::open()?;
        Ok(Self::new(Arc::new(sink), Arc::new(TokioClock::new())))
    }

    /// Schedule one decoded unit for playback. Returns the resolved start
    /// time on the scheduler's clock.
    pub fn enqueue(&self, audio: DecodedAudio) -> Result<Duration> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(VoiceError::SessionClosed);
        }

        let duration = audio.duration();
        let mut state = self.state.lock();

        let now = self.clock.now();
        let start = now.max(state.next_start);
        state.next_start = start + duration;

        self.sink.play(&audio.samples, audio.sample_rate)?;

        let id = state.next_unit_id;
        state.next_unit_id += 1;

        // Retirement runs on the timer: the unit leaves the in-flight set
        // once its scheduled interval has fully elapsed. The state lock is
        // held across the spawn so the entry is registered before the task
        // can possibly retire it.
        let wait = (start + duration).saturating_sub(now);
        let shared = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            shared.lock().inflight.remove(&id);
        });
        state.inflight.insert(id, handle);

        tracing::trace!(unit = id, ?start, ?duration, "Scheduled playback unit");
        Ok(start)
    }

    /// Whether any unit is pending or audible.
    pub fn is_speaking(&self) -> bool {
        !self.state.lock().inflight.is_empty()
    }

    /// Barge-in: halt every in-flight unit, clear the set, and reset the
    /// clock cursor to now. No-op when nothing is playing.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        for (_, handle) in state.inflight.drain() {
            handle.abort();
        }
        state.next_start = self.clock.now();
        drop(state);

        self.sink.stop();
    }

    /// Interrupt and release the output device. Idempotent: the second and
    /// later calls do nothing.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.interrupt();
        self.sink.release();
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PlaybackScheduler")
            .field("next_start", &state.next_start)
            .field("inflight", &state.inflight.len())
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .finish()
    }
}

// ── Rodio-backed sink ───────────────────────────────────────────────────

enum SinkCommand {
    PlaySamples(Vec<f32>, u32),
    PlayEncoded(Vec<u8>, tokio::sync::oneshot::Sender<Result<()>>),
    Stop,
    Shutdown,
}

/// Production output sink. The rodio output stream is `!Send`, so it lives
/// on a dedicated thread and the sink hands commands across a channel.
pub struct RodioSink {
    tx: std::sync::mpsc::Sender<SinkCommand>,
}

impl RodioSink {
    /// Open the default output device.
    pub fn open() -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel::<SinkCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);

        std::thread::Builder::new()
            .name("aura-playback".into())
            .spawn(move || Self::run(rx, ready_tx))
            .map_err(|e| VoiceError::config(format!("Playback thread spawn failed: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::HardwareMissing.into()),
        }
    }

    fn run(
        rx: std::sync::mpsc::Receiver<SinkCommand>,
        ready_tx: std::sync::mpsc::SyncSender<Result<()>>,
    ) {
        let (stream, handle) = match rodio::OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready_tx.send(Err(classify_output_error(&e.to_string()).into()));
                return;
            }
        };
        let mut sink = match rodio::Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = ready_tx.send(Err(classify_output_error(&e.to_string()).into()));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        while let Ok(cmd) = rx.recv() {
            match cmd {
                SinkCommand::PlaySamples(samples, rate) => {
                    sink.append(rodio::buffer::SamplesBuffer::new(1, rate, samples));
                    sink.play();
                }
                SinkCommand::PlayEncoded(bytes, done) => {
                    use rodio::Source;
                    match rodio::Decoder::new(std::io::Cursor::new(bytes)) {
                        Ok(source) => {
                            sink.append(source.convert_samples::<f32>());
                            sink.play();
                            sink.sleep_until_end();
                            let _ = done.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = done.send(Err(VoiceError::protocol(format!(
                                "Undecodable synthesis audio: {e}"
                            ))));
                        }
                    }
                }
                SinkCommand::Stop => {
                    sink.stop();
                    // A stopped sink refuses later appends; swap in a fresh one.
                    if let Ok(fresh) = rodio::Sink::try_new(&handle) {
                        sink = fresh;
                    }
                }
                SinkCommand::Shutdown => break,
            }
        }
        drop(stream);
    }

    /// Play a whole encoded clip (WAV/MP3) and resolve when it finishes.
    /// Used by the discrete loop's synthesizer, never by the scheduler.
    pub async fn play_encoded(&self, bytes: Vec<u8>) -> Result<()> {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SinkCommand::PlayEncoded(bytes, done_tx))
            .map_err(|_| VoiceError::SessionClosed)?;
        done_rx.await.map_err(|_| VoiceError::SessionClosed)?
    }
}

impl OutputSink for RodioSink {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        self.tx
            .send(SinkCommand::PlaySamples(samples.to_vec(), sample_rate))
            .map_err(|_| VoiceError::SessionClosed)
    }

    fn stop(&self) {
        let _ = self.tx.send(SinkCommand::Stop);
    }

    fn release(&self) {
        let _ = self.tx.send(SinkCommand::Shutdown);
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.tx.send(SinkCommand::Shutdown);
    }
}

fn classify_output_error(description: &str) -> DeviceError {
    DeviceError::classify_description(description, DeviceError::HardwareMissing)
}
