//! Stateful linear-interpolation resampler for the capture path.
//!
//! Converts arbitrary-length blocks of native-rate f32 mono samples into
//! target-rate signed 16-bit PCM. The fractional read cursor and the
//! unconsumed tail carry across blocks, so feeding audio incrementally
//! produces exactly the same output as one call with the concatenated
//! input — no samples are lost or duplicated at block boundaries.

use crate::error::{Result, VoiceError};

/// One resampled block of capture audio.
#[derive(Debug, Clone)]
pub struct ResampledBlock {
    /// Target-rate mono samples, signed 16-bit.
    pub samples: Vec<i16>,
    /// Root-mean-square energy of the resampled output in [0, 1].
    ///
    /// Level-meter / voice-activity input only — the speech/silence
    /// decision belongs to the consumer.
    pub rms: f32,
}

impl ResampledBlock {
    /// Little-endian byte view of the samples, ready for transport.
    pub fn pcm_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Whether the block produced no output samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Linear-interpolation resampler with cross-block continuity.
///
/// Owned exclusively by the capture thread; reset only on session restart.
pub struct LinearResampler {
    /// Source samples consumed per output sample.
    ratio: f64,
    /// Fractional read cursor into `tail ++ next block`, in source units.
    pos: f64,
    /// Unconsumed source samples carried from the previous block.
    tail: Vec<f32>,
}

impl LinearResampler {
    /// Create a resampler converting `source_rate` to `target_rate`.
    ///
    /// # Errors
    ///
    /// Returns an error if either rate is zero.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(VoiceError::Config(
                "sample rates must be greater than 0".into(),
            ));
        }
        Ok(Self {
            ratio: f64::from(source_rate) / f64::from(target_rate),
            pos: 0.0,
            tail: Vec::new(),
        })
    }

    /// Resample one block of native-rate mono samples.
    ///
    /// Input values are nominally in [-1, 1] but are clamped before
    /// conversion, so out-of-range samples cannot overflow the 16-bit
    /// output range.
    pub fn process(&mut self, block: &[f32]) -> ResampledBlock {
        self.tail.extend_from_slice(block);

        let combined = &self.tail;
        let mut samples = Vec::new();
        let mut sum_sq = 0.0f64;

        loop {
            let idx = self.pos as usize;
            if idx + 1 >= combined.len() {
                break;
            }
            let frac = (self.pos - idx as f64) as f32;
            let interpolated = combined[idx] * (1.0 - frac) + combined[idx + 1] * frac;
            let clamped = interpolated.clamp(-1.0, 1.0);
            sum_sq += f64::from(clamped) * f64::from(clamped);
            samples.push(to_i16(clamped));
            self.pos += self.ratio;
        }

        // Retain everything from floor(pos) on; pos keeps only its fraction.
        let consumed = (self.pos as usize).min(self.tail.len());
        self.tail.drain(..consumed);
        self.pos -= consumed as f64;

        let rms = if samples.is_empty() {
            0.0
        } else {
            (sum_sq / samples.len() as f64).sqrt() as f32
        };

        ResampledBlock { samples, rms }
    }

    /// Clear the cursor and tail for a fresh session.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.tail.clear();
    }
}

/// Convert a clamped f32 sample to i16.
///
/// Negative values scale by 32768 and non-negative by 32767 so both
/// extremes land exactly on the signed 16-bit bounds.
fn to_i16(sample: f32) -> i16 {
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}
