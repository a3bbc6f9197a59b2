//! Microphone capture pipeline.
//!
//! Owns the input device stream and slices the continuous signal into
//! fixed-size frames, delivered over a channel to the session's send pump.
//! The cpal stream is `!Send` on some platforms, so it lives on a dedicated
//! thread; frames cross into the async world through an unbounded channel
//! (audio callbacks must never block).
//!
//! Device acquisition degrades gracefully: the preferred configuration
//! (16 kHz mono) is tried first, and if the platform rejects it the device's
//! own default configuration is used instead, with downmix and linear
//! resampling applied in the callback.

use crate::codec::INPUT_SAMPLE_RATE;
use crate::error::{DeviceError, Result, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Samples per delivered frame.
pub const FRAME_SAMPLES: usize = 4096;

/// Capture device configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate of delivered frames.
    pub sample_rate: u32,
    /// Target channel count (frames are always delivered mono).
    pub channels: u16,
    /// Samples per frame.
    pub frame_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { sample_rate: INPUT_SAMPLE_RATE, channels: 1, frame_samples: FRAME_SAMPLES }
    }
}

/// Acquires a capture device and starts frame delivery.
///
/// A seam so sessions can run against a scripted source in tests; the
/// production implementation is [`Microphone`].
pub trait CaptureSource: Send + Sync {
    /// Open the device and start delivering frames. The returned handle
    /// owns the device; dropping or stopping it releases the device and
    /// guarantees no further frames arrive.
    fn start(&self, config: &CaptureConfig) -> Result<CaptureHandle>;
}

/// Kill switch for a running capture, cloneable so session teardown can
/// halt the device while the send pump owns the frame receiver.
#[derive(Clone)]
pub struct CaptureStop {
    gate: Arc<AtomicBool>,
    shutdown: Arc<parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>>,
}

impl CaptureStop {
    /// Build a stop handle over a fresh gate. `shutdown` is signalled once,
    /// on the first [`stop`](Self::stop), to let the device thread drop its
    /// stream; test sources pass `None`.
    pub fn new(gate: Arc<AtomicBool>, shutdown: Option<std::sync::mpsc::Sender<()>>) -> Self {
        Self { gate, shutdown: Arc::new(parking_lot::Mutex::new(shutdown)) }
    }

    /// Stop capturing and release the device.
    ///
    /// The gate flips synchronously, so the device callback forwards
    /// nothing from this point on. Safe to call more than once.
    pub fn stop(&self) {
        self.gate.store(true, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }
}

/// A running capture: frame receiver plus the stop gate.
pub struct CaptureHandle {
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    stop: CaptureStop,
}

impl CaptureHandle {
    /// Assemble a handle from its parts. Test sources build handles around
    /// a scripted channel; [`Microphone`] wires in the device thread.
    pub fn new(frames: mpsc::UnboundedReceiver<Vec<f32>>, stop: CaptureStop) -> Self {
        Self { frames, stop }
    }

    /// Receive the next frame. Returns `None` once the capture has stopped
    /// and the channel has drained.
    pub async fn next_frame(&mut self) -> Option<Vec<f32>> {
        self.frames.recv().await
    }

    /// A cloneable stop handle for teardown paths that do not own the
    /// receiver.
    pub fn stop_handle(&self) -> CaptureStop {
        self.stop.clone()
    }

    /// Stop capturing, release the device and refuse further frames.
    pub fn stop(&mut self) {
        self.stop.stop();
        self.frames.close();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── cpal-backed source ──────────────────────────────────────────────────

/// The system microphone.
pub struct Microphone;

impl CaptureSource for Microphone {
    fn start(&self, config: &CaptureConfig) -> Result<CaptureHandle> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let thread_config = config.clone();
        std::thread::Builder::new()
            .name("aura-capture".into())
            .spawn(move || run_device(thread_config, thread_stop, frame_tx, shutdown_rx, ready_tx))
            .map_err(|e| VoiceError::config(format!("Capture thread spawn failed: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                Ok(CaptureHandle::new(frame_rx, CaptureStop::new(stop, Some(shutdown_tx))))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::PlatformUnsupported.into()),
        }
    }
}

fn run_device(
    config: CaptureConfig,
    stop: Arc<AtomicBool>,
    frames: mpsc::UnboundedSender<Vec<f32>>,
    shutdown: std::sync::mpsc::Receiver<()>,
    ready: std::sync::mpsc::SyncSender<Result<()>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let missing = if host.input_devices().map(|mut d| d.next().is_none()).unwrap_or(true) {
            DeviceError::HardwareMissing
        } else {
            DeviceError::PermissionDenied
        };
        let _ = ready.send(Err(missing.into()));
        return;
    };

    let name = device.name().unwrap_or_else(|_| "unknown".into());
    tracing::info!(device = %name, rate = config.sample_rate, "Opening capture device");

    let stream = match open_stream(&device, &config, stop, frames) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(classify_play_error(&e).into()));
        return;
    }
    let _ = ready.send(Ok(()));

    // Keep the stream alive until the handle asks for shutdown (or drops).
    let _ = shutdown.recv();
    drop(stream);
    tracing::debug!(device = %name, "Capture device released");
}

fn open_stream(
    device: &cpal::Device,
    config: &CaptureConfig,
    stop: Arc<AtomicBool>,
    frames: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let preferred = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut slicer = FrameSlicer::new(config.frame_samples);
    let gate = Arc::clone(&stop);
    let tx = frames.clone();
    let preferred_cb = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if gate.load(Ordering::SeqCst) {
            return;
        }
        slicer.push(data, |frame| {
            let _ = tx.send(frame);
        });
    };

    match device.build_input_stream(&preferred, preferred_cb, log_stream_error, None) {
        Ok(stream) => Ok(stream),
        Err(
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument,
        ) => open_fallback_stream(device, config, stop, frames),
        Err(e) => Err(classify_build_error(&e).into()),
    }
}

/// Preferred configuration rejected: take whatever the device offers and
/// convert in the callback.
fn open_fallback_stream(
    device: &cpal::Device,
    config: &CaptureConfig,
    stop: Arc<AtomicBool>,
    frames: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let supported = device
        .default_input_config()
        .map_err(|e| VoiceError::from(classify_default_config_error(&e)))?;
    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels();
    tracing::warn!(
        device_rate,
        device_channels,
        target_rate = config.sample_rate,
        "Preferred capture config rejected, converting from device default"
    );

    let target_rate = config.sample_rate;
    let mut slicer = FrameSlicer::new(config.frame_samples);
    let fallback_cb = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let mono = downmix(data, device_channels);
        let resampled = resample_linear(&mono, device_rate, target_rate);
        slicer.push(&resampled, |frame| {
            let _ = frames.send(frame);
        });
    };

    device
        .build_input_stream(&supported.config(), fallback_cb, log_stream_error, None)
        .map_err(|e| classify_build_error(&e).into())
}

fn log_stream_error(err: cpal::StreamError) {
    tracing::warn!(error = %err, "Capture stream error");
}

fn classify_build_error(e: &cpal::BuildStreamError) -> DeviceError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceError::HardwareBusy,
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => DeviceError::PlatformUnsupported,
        cpal::BuildStreamError::BackendSpecific { err } => {
            DeviceError::classify_description(&err.description, DeviceError::PlatformUnsupported)
        }
        _ => DeviceError::PlatformUnsupported,
    }
}

fn classify_default_config_error(e: &cpal::DefaultStreamConfigError) -> DeviceError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::HardwareBusy,
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => DeviceError::PlatformUnsupported,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            DeviceError::classify_description(&err.description, DeviceError::PlatformUnsupported)
        }
    }
}

fn classify_play_error(e: &cpal::PlayStreamError) -> DeviceError {
    match e {
        cpal::PlayStreamError::DeviceNotAvailable => DeviceError::HardwareBusy,
        cpal::PlayStreamError::BackendSpecific { err } => {
            DeviceError::classify_description(&err.description, DeviceError::HardwareBusy)
        }
    }
}

// ── Signal shaping ──────────────────────────────────────────────────────

/// Accumulates arbitrarily sized device callbacks into exact fixed-size
/// frames: no drops, no overlap, leftovers carried into the next push.
pub struct FrameSlicer {
    pending: Vec<f32>,
    frame_samples: usize,
}

impl FrameSlicer {
    pub fn new(frame_samples: usize) -> Self {
        Self { pending: Vec::with_capacity(frame_samples), frame_samples }
    }

    /// Feed captured samples, emitting every completed frame in order.
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.pending.extend_from_slice(input);
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let frame = std::mem::replace(&mut self.pending, rest);
            emit(frame);
        }
    }
}

/// Average interleaved channels down to mono. Mono input passes through.
pub fn downmix(input: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }
    let channels = channels as usize;
    input
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear resampling between sample rates. Matching rates pass through.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = ((input.len() as f64) / ratio).floor() as usize;
    (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position as usize;
            let fraction = (position - index as f64) as f32;
            let current = input[index];
            let next = input.get(index + 1).copied().unwrap_or(current);
            current + (next - current) * fraction
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slicer_emits_exact_frames_in_order() {
        let mut slicer = FrameSlicer::new(4);
        let mut frames = Vec::new();

        slicer.push(&[1.0, 2.0, 3.0], |f| frames.push(f));
        assert!(frames.is_empty());

        slicer.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);

        // The leftover sample is carried, not dropped.
        slicer.push(&[10.0, 11.0, 12.0], |f| frames.push(f));
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], vec![9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_slicer_handles_oversized_bursts() {
        let mut slicer = FrameSlicer::new(2);
        let mut frames = Vec::new();
        slicer.push(&[0.0; 7], |f| frames.push(f));
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 2));
    }

    #[test]
    fn test_downmix_stereo_averages_pairs() {
        let mixed = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mixed, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&input, 1), input);
    }

    #[test]
    fn test_resample_halves_length() {
        let input: Vec<f32> = (0..96).map(|i| i as f32).collect();
        let output = resample_linear(&input, 48_000, 16_000);
        assert_eq!(output.len(), 32);
        // A linear ramp resamples onto the same line.
        assert!((output[1] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_resample_same_rate_passthrough() {
        let input = vec![0.5, -0.5];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[tokio::test]
    async fn test_handle_stop_closes_frame_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(AtomicBool::new(false));
        let mut handle = CaptureHandle::new(rx, CaptureStop::new(Arc::clone(&gate), None));

        tx.send(vec![0.0; 4]).unwrap();
        assert_eq!(handle.next_frame().await.unwrap().len(), 4);

        handle.stop();
        assert!(gate.load(Ordering::SeqCst));
        // The gate is up: producers are refused and the stream ends.
        assert!(tx.send(vec![0.0; 4]).is_err());
        assert!(handle.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_detached_stop_handle_flips_the_gate() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(AtomicBool::new(false));
        let handle = CaptureHandle::new(rx, CaptureStop::new(Arc::clone(&gate), None));

        let stop = handle.stop_handle();
        assert!(!stop.is_stopped());
        stop.stop();
        stop.stop();
        assert!(gate.load(Ordering::SeqCst));
    }

    #[test]
    fn test_default_config_matches_wire_format() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.frame_samples, FRAME_SAMPLES);
    }
}
