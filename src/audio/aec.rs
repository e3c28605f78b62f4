//! Acoustic echo cancellation for the capture path.
//!
//! The platform capture layer exposes no echo-cancellation, noise-
//! suppression, or auto-gain constraints, so echo removal happens in
//! software: an FDAF adaptive filter subtracts the playback signal from
//! the microphone signal frame by frame, keeping narrated audio out of
//! the frames sent to the voice service.
//!
//! # Architecture
//!
//! ```text
//! Capture (native rate) → [EchoCanceller] → resampler → transport
//!                              ↑                            │
//!                              └── ReferenceBuffer ←── playback scheduler
//! ```

use crate::config::AecConfig;
use crate::error::{Result, VoiceError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared ring buffer holding resampled reference audio from playback.
///
/// The playback side pushes output-rate samples via
/// [`ReferenceHandle::push`], which are resampled to the capture device
/// rate on the fly. The canceller drains frames matching the microphone
/// frame size. Holds at most 2 seconds at the capture rate.
pub struct ReferenceBuffer {
    inner: Arc<Mutex<VecDeque<f32>>>,
    playback_rate: u32,
    capture_rate: u32,
}

impl ReferenceBuffer {
    /// Create a reference buffer bridging the playback rate to the
    /// capture device rate.
    pub fn new(playback_rate: u32, capture_rate: u32) -> Self {
        let capacity = (capture_rate as usize) * 2;
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            playback_rate,
            capture_rate,
        }
    }

    /// Clone a push handle for the playback side.
    pub fn handle(&self) -> ReferenceHandle {
        ReferenceHandle {
            inner: Arc::clone(&self.inner),
            playback_rate: self.playback_rate,
            capture_rate: self.capture_rate,
        }
    }

    /// Drain exactly `n` samples, zero-filling when fewer are buffered.
    pub fn drain_frame(&self, n: usize) -> Vec<f32> {
        let mut buf = match self.inner.lock() {
            Ok(b) => b,
            Err(p) => p.into_inner(),
        };
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(buf.pop_front().unwrap_or(0.0));
        }
        out
    }

    /// Discard all buffered reference audio.
    pub fn clear(&self) {
        let mut buf = match self.inner.lock() {
            Ok(b) => b,
            Err(p) => p.into_inner(),
        };
        buf.clear();
    }
}

/// Clonable push side of the reference buffer, held by playback.
#[derive(Clone)]
pub struct ReferenceHandle {
    inner: Arc<Mutex<VecDeque<f32>>>,
    playback_rate: u32,
    capture_rate: u32,
}

impl ReferenceHandle {
    /// Push playback samples, resampling to the capture rate first.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let resampled = if self.playback_rate != self.capture_rate {
            resample_linear(samples, self.playback_rate, self.capture_rate)
        } else {
            samples.to_vec()
        };
        let mut buf = match self.inner.lock() {
            Ok(b) => b,
            Err(p) => p.into_inner(),
        };
        // Cap at 2 seconds of capture-rate audio.
        let cap = (self.capture_rate as usize) * 2;
        let data = if resampled.len() > cap {
            &resampled[resampled.len() - cap..]
        } else {
            &resampled[..]
        };
        let overflow = data.len().saturating_sub(cap.saturating_sub(buf.len()));
        for _ in 0..overflow {
            buf.pop_front();
        }
        buf.extend(data.iter());
    }

    /// Discard all buffered reference audio.
    pub fn clear(&self) {
        let mut buf = match self.inner.lock() {
            Ok(b) => b,
            Err(p) => p.into_inner(),
        };
        buf.clear();
    }
}

/// Frame-by-frame echo canceller wrapping [`fdaf_aec::FdafAec`].
///
/// Owned by the capture thread; `process` sits between the device
/// callback and the resampler.
pub struct EchoCanceller {
    filter: fdaf_aec::FdafAec,
    reference: ReferenceBuffer,
    frame_size: usize,
}

impl EchoCanceller {
    /// Create a canceller over the given reference buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `fft_size` is not a non-zero power of two.
    pub fn new(config: &AecConfig, reference: ReferenceBuffer) -> Result<Self> {
        if config.fft_size == 0 || !config.fft_size.is_power_of_two() {
            return Err(VoiceError::Audio(format!(
                "AEC fft_size must be a non-zero power of two, got {}",
                config.fft_size
            )));
        }
        let filter = fdaf_aec::FdafAec::new(config.fft_size, config.step_size);
        let frame_size = config.fft_size / 2;
        Ok(Self {
            filter,
            reference,
            frame_size,
        })
    }

    /// Remove buffered reference audio from one microphone block.
    ///
    /// Drains a matching reference frame per full filter frame; a
    /// sub-frame remainder passes through unprocessed.
    pub fn process(&mut self, mic: &[f32]) -> Vec<f32> {
        if mic.is_empty() {
            return Vec::new();
        }

        let mut output = Vec::with_capacity(mic.len());
        let mut offset = 0;

        while offset + self.frame_size <= mic.len() {
            let mic_frame = &mic[offset..offset + self.frame_size];
            let ref_frame = self.reference.drain_frame(self.frame_size);
            let cleaned = self.filter.process(&ref_frame, mic_frame);
            output.extend_from_slice(&cleaned);
            offset += self.frame_size;
        }

        if offset < mic.len() {
            output.extend_from_slice(&mic[offset..]);
        }

        output
    }
}

/// Linear-interpolation rate conversion for the reference path.
fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };
        output.push(sample as f32);
    }

    output
}
