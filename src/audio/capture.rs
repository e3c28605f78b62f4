//! Microphone session management.
//!
//! [`MicSession`] acquires the input device through the injected
//! capability provider, runs the resampler on the audio thread, and
//! delivers target-rate PCM frames to the control loop over a bounded
//! channel. Resample state is touched only from the audio thread.

use crate::audio::aec::EchoCanceller;
use crate::audio::provider::{AudioCapabilityProvider, CaptureSource};
use crate::audio::resampler::LinearResampler;
use crate::error::{Result, VoiceError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One resampled capture frame delivered to the control loop.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Target-rate mono PCM, signed 16-bit little-endian.
    pub pcm: Vec<u8>,
    /// RMS energy of the frame in [0, 1] for level/VAD display.
    pub rms: f32,
}

/// Exclusive holder of one audio input device.
///
/// Start/stop lifecycle with guaranteed release: `stop` is idempotent and
/// `Drop` releases the device on abandonment or error paths.
pub struct MicSession {
    provider: Arc<dyn AudioCapabilityProvider>,
    source: Option<CaptureSource>,
}

impl MicSession {
    /// Create a session over the given capability provider.
    pub fn new(provider: Arc<dyn AudioCapabilityProvider>) -> Self {
        Self {
            provider,
            source: None,
        }
    }

    /// Acquire the microphone and begin delivering resampled frames.
    ///
    /// When an [`EchoCanceller`] is supplied it runs on the audio thread
    /// ahead of the resampler, so playback echo never reaches the frames.
    /// Frames are sent with `try_send`; when the control loop lags, frames
    /// are dropped with a debug log rather than blocking the audio thread.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Audio`] if capture is already running,
    /// [`VoiceError::DeviceUnavailable`] /
    /// [`VoiceError::CapabilityUnavailable`] from the provider, or a
    /// config error for an unusable rate pair.
    pub fn start(
        &mut self,
        target_rate: u32,
        mut aec: Option<EchoCanceller>,
        tx: mpsc::Sender<CaptureFrame>,
    ) -> Result<()> {
        if self.source.is_some() {
            return Err(VoiceError::Audio("capture already running".into()));
        }

        let native_rate = self.provider.input_sample_rate()?;
        let mut resampler = LinearResampler::new(native_rate, target_rate)?;

        let source = self.provider.open_capture(Box::new(move |block| {
            let cleaned;
            let block = match aec.as_mut() {
                Some(canceller) => {
                    cleaned = canceller.process(block);
                    &cleaned[..]
                }
                None => block,
            };
            let out = resampler.process(block);
            if out.is_empty() {
                return;
            }
            let frame = CaptureFrame {
                pcm: out.pcm_bytes(),
                rms: out.rms,
            };
            if tx.try_send(frame).is_err() {
                debug!("capture channel full, dropping frame");
            }
        }))?;

        self.source = Some(source);
        info!("capture started: native {native_rate}Hz -> target {target_rate}Hz");
        Ok(())
    }

    /// Release the device and processing graph. Safe to call repeatedly
    /// or after an error.
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            info!("capture stopped");
        }
    }

    /// Whether a capture source is currently held.
    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }
}

impl Drop for MicSession {
    fn drop(&mut self) {
        self.stop();
    }
}
