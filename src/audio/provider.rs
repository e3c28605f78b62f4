//! Injected audio capability seam.
//!
//! The capture and playback components never touch platform audio APIs
//! directly — they go through [`AudioCapabilityProvider`], so the pipeline
//! is testable without real hardware. [`CpalProvider`] is the production
//! implementation over cpal.
//!
//! cpal streams are `!Send`, so each open spawns a dedicated thread that
//! owns the stream for its whole life; control flow only ever exchanges
//! messages with it. Capture callbacks run on that audio thread.

use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Handler invoked on the capture thread with each mono native-rate block.
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send>;

/// A live capture acquisition. Stopping (or dropping) releases the device.
pub struct CaptureSource {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureSource {
    /// Wrap a release action. The action runs at most once.
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// Release the device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output path that accepts normalized f32 samples for audible playback.
///
/// Samples are played strictly in the order written. `clear` drops
/// everything not yet played so stale audio never sounds after an
/// interruption.
pub trait PlaybackSink: Send {
    /// Append samples to the output queue.
    fn write(&mut self, samples: &[f32]);
    /// Drop all queued-but-unplayed samples.
    fn clear(&mut self);
    /// Release the output device. Tolerant of repeated calls.
    fn close(&mut self);
}

/// Platform audio facility, injected into capture and playback.
pub trait AudioCapabilityProvider: Send + Sync {
    /// Native sample rate of the input device, probed before capture.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::DeviceUnavailable`] when no input device
    /// exists, or [`VoiceError::CapabilityUnavailable`] when the audio
    /// runtime cannot describe it.
    fn input_sample_rate(&self) -> Result<u32>;

    /// Acquire the microphone and begin delivering mono blocks at the
    /// native rate until the returned source is stopped.
    ///
    /// The captured signal is never routed to an output device — capture
    /// is for transport only.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::input_sample_rate`].
    fn open_capture(&self, on_block: BlockHandler) -> Result<CaptureSource>;

    /// Open an output path at the given sample rate.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::CapabilityUnavailable`] when no output
    /// device or configuration is available.
    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackSink>>;
}

/// Production provider over cpal.
pub struct CpalProvider {
    input_device: Option<String>,
}

impl CpalProvider {
    /// Create a provider honoring the configured input device selection.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            input_device: config.input_device.clone(),
        }
    }

    fn find_input_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.input_device {
            host.input_devices()
                .map_err(|e| {
                    VoiceError::CapabilityUnavailable(format!("cannot enumerate devices: {e}"))
                })?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    VoiceError::DeviceUnavailable(format!("input device '{name}' not found"))
                })
        } else {
            host.default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".into()))
        }
    }
}

impl AudioCapabilityProvider for CpalProvider {
    fn input_sample_rate(&self) -> Result<u32> {
        let device = self.find_input_device()?;
        let config = device.default_input_config().map_err(|e| {
            VoiceError::CapabilityUnavailable(format!("no default input config: {e}"))
        })?;
        Ok(config.sample_rate())
    }

    fn open_capture(&self, mut on_block: BlockHandler) -> Result<CaptureSource> {
        let device = self.find_input_device()?;
        let default_config = device.default_input_config().map_err(|e| {
            VoiceError::CapabilityUnavailable(format!("no default input config: {e}"))
        })?;

        let native_channels = default_config.channels();
        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("hearth-capture".into())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        if native_channels > 1 {
                            let mono = to_mono(data, native_channels);
                            on_block(&mono);
                        } else {
                            on_block(data);
                        }
                    },
                    move |err| {
                        error!("audio input stream error: {err}");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(VoiceError::CapabilityUnavailable(format!(
                            "failed to build input stream: {e}"
                        ))));
                        return;
                    }
                };

                // The stream may start suspended; play() resumes it before
                // the caller sees success.
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::CapabilityUnavailable(format!(
                        "failed to start input stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Hold the stream alive until stopped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::Audio(format!("failed to spawn capture thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Channel("capture thread exited before ready".into()))??;

        Ok(CaptureSource::new(move || {
            let _ = stop_tx.send(());
        }))
    }

    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackSink>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VoiceError::CapabilityUnavailable("no default output device".into()))?;

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let callback_queue = Arc::clone(&queue);

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("hearth-playback".into())
            .spawn(move || {
                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let mut q = match callback_queue.lock() {
                            Ok(q) => q,
                            Err(p) => p.into_inner(),
                        };
                        for sample in data.iter_mut() {
                            *sample = q.pop_front().unwrap_or(0.0);
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(VoiceError::CapabilityUnavailable(format!(
                            "failed to build output stream: {e}"
                        ))));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::CapabilityUnavailable(format!(
                        "failed to start output stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::Audio(format!("failed to spawn playback thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Channel("playback thread exited before ready".into()))??;

        Ok(Box::new(CpalSink {
            queue,
            stop_tx: Some(stop_tx),
        }))
    }
}

/// Sink backed by the shared queue drained by the cpal output callback.
struct CpalSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl PlaybackSink for CpalSink {
    fn write(&mut self, samples: &[f32]) {
        let mut q = match self.queue.lock() {
            Ok(q) => q,
            Err(p) => p.into_inner(),
        };
        q.extend(samples.iter().copied());
    }

    fn clear(&mut self) {
        let mut q = match self.queue.lock() {
            Ok(q) => q,
            Err(p) => p.into_inner(),
        };
        q.clear();
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.clear();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
