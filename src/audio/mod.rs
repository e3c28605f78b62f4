//! Audio capture, resampling, and playback scheduling.

pub mod aec;
pub mod capture;
pub mod playback;
pub mod provider;
pub mod resampler;

pub use aec::{EchoCanceller, ReferenceBuffer, ReferenceHandle};
pub use capture::{CaptureFrame, MicSession};
pub use playback::{PlaybackScheduler, ScheduledUnit};
pub use provider::{AudioCapabilityProvider, CpalProvider, PlaybackSink};
pub use resampler::{LinearResampler, ResampledBlock};
