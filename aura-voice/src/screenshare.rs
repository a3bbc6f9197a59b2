//! Screen-share side channel.
//!
//! While a duplex call is open, an optional sampler grabs the primary
//! monitor once per second, downsamples the frame to a small JPEG and
//! offers it to the session's auxiliary feed. The feed holds one frame and
//! producers never wait: when the previous image is still being sent, the
//! new sample is dropped, so screen frames can never delay audio.
//!
//! The sampler stops on its own when the display goes away (platform
//! revoked capture, monitor unplugged) and when the call ends (the feed
//! closes).

use crate::codec::WireAudioPacket;
use crate::error::{DeviceError, Result, VoiceError};
use crate::live::AuxFeed;
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often the screen is sampled.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Frames wider than this are scaled down before encoding.
pub const MAX_FRAME_WIDTH: u32 = 640;

const JPEG_QUALITY: u8 = 70;

/// Produces one raw frame per call.
///
/// A seam over [`PrimaryMonitor`] so the sampler is testable without a
/// display. A returned error means the display is gone and the share ends.
pub trait FrameGrabber: Send + Sync {
    fn grab(&self) -> Result<RgbaImage>;
}

/// Grabs the primary monitor via the platform capture API.
pub struct PrimaryMonitor;

impl FrameGrabber for PrimaryMonitor {
    fn grab(&self) -> Result<RgbaImage> {
        let monitors = xcap::Monitor::all().map_err(map_capture_error)?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or(VoiceError::Device(DeviceError::HardwareMissing))?;
        monitor.capture_image().map_err(map_capture_error)
    }
}

/// The capture backend reports denial and absence as strings.
fn map_capture_error(e: xcap::XCapError) -> VoiceError {
    DeviceError::classify_description(&e.to_string(), DeviceError::HardwareMissing).into()
}

/// A running screen share.
#[derive(Debug)]
pub struct ScreenShare {
    stop: Arc<AtomicBool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ScreenShare {
    /// Probe display access and start the 1 Hz sampler into `feed`.
    ///
    /// Fails with a [`DeviceError`] when the display cannot be captured at
    /// all, so permission problems surface at start rather than as a
    /// silently idle share.
    pub async fn start(grabber: Arc<dyn FrameGrabber>, feed: AuxFeed) -> Result<Self> {
        Self::start_with(grabber, feed, SAMPLE_INTERVAL).await
    }

    /// [`start`](Self::start) with an explicit sampling interval.
    pub async fn start_with(
        grabber: Arc<dyn FrameGrabber>,
        feed: AuxFeed,
        interval: Duration,
    ) -> Result<Self> {
        let probe = Arc::clone(&grabber);
        tokio::task::spawn_blocking(move || probe.grab().map(|_| ()))
            .await
            .map_err(|_| VoiceError::Device(DeviceError::PlatformUnsupported))??;

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(sample_loop(grabber, feed, interval, Arc::clone(&stop)));
        tracing::info!(?interval, "Screen share started");

        Ok(Self { stop, task: Mutex::new(Some(task)) })
    }

    /// Whether the sampler is still running.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop sampling. Idempotent; also invoked on drop.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for ScreenShare {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sample_loop(
    grabber: Arc<dyn FrameGrabber>,
    feed: AuxFeed,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if stop.load(Ordering::SeqCst) || feed.is_closed() {
            break;
        }

        // Grab and encode off the async threads; capture APIs block.
        let worker = Arc::clone(&grabber);
        let encoded = tokio::task::spawn_blocking(move || {
            worker.grab().map(|frame| encode_sample(&frame))
        })
        .await;

        match encoded {
            Ok(Ok(Ok(packet))) => {
                if feed.is_closed() {
                    break;
                }
                if !feed.offer(packet) {
                    tracing::trace!("Screen frame dropped, previous send in flight");
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "Screen frame encode failed, skipping sample");
            }
            Ok(Err(e)) => {
                // The display went away; the share ends on its own.
                tracing::info!(error = %e, "Display capture ended, stopping screen share");
                break;
            }
            Err(_) => break,
        }
    }
    tracing::debug!("Screen share sampler ended");
}

/// Downscale a raw frame and encode it as the auxiliary wire packet.
fn encode_sample(frame: &RgbaImage) -> Result<WireAudioPacket> {
    let image = image::DynamicImage::ImageRgba8(frame.clone());
    let scaled = if image.width() > MAX_FRAME_WIDTH {
        image.resize(MAX_FRAME_WIDTH, u32::MAX, image::imageops::FilterType::Triangle)
    } else {
        image
    };

    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    encoder
        .encode_image(&scaled.to_rgb8())
        .map_err(|e| VoiceError::config(format!("JPEG encode failed: {e}")))?;

    Ok(WireAudioPacket::from_bytes(&bytes, "image/jpeg"))
}
