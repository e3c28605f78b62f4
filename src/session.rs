//! Voice session orchestration.
//!
//! Wires the capture, transport, and playback components into one
//! logical session: microphone frames flow out over the connection,
//! inbound synthesized audio flows into the playback scheduler, and
//! parsed control events surface to the application. One instance per
//! logical voice session.

use crate::audio::provider::AudioCapabilityProvider;
use crate::audio::{CaptureFrame, EchoCanceller, MicSession, PlaybackScheduler, ReferenceBuffer};
use crate::auth::TokenProvider;
use crate::config::VoiceConfig;
use crate::error::Result;
use crate::transport::protocol::{
    AudioFormat, ClientMessage, ServerMessage, SessionContext, VoiceSelection,
};
use crate::transport::provider::TransportProvider;
use crate::transport::{SessionState, VoiceClient, VoiceHandlers};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capture channel depth; at 16kHz with ~10ms device blocks this is
/// several hundred ms of slack before frames drop.
const CAPTURE_CHANNEL_DEPTH: usize = 64;

/// Application-facing callbacks for one session.
pub struct SessionHandlers {
    /// Parsed inbound control events (transcripts, assistant text, errors).
    pub on_event: Box<dyn FnMut(ServerMessage) + Send>,
    /// Capture level (RMS per frame) for a meter/VAD indicator.
    pub on_level: Option<Box<dyn FnMut(f32) + Send>>,
}

/// One live voice session over the family journal's voice service.
pub struct VoiceSession {
    config: VoiceConfig,
    audio: Arc<dyn AudioCapabilityProvider>,
    tokens: Arc<dyn TokenProvider>,
    client: VoiceClient,
    mic: MicSession,
    scheduler: Option<Arc<Mutex<PlaybackScheduler>>>,
    pump: Option<tokio::task::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl VoiceSession {
    /// Assemble a session from its injected collaborators.
    pub fn new(
        config: VoiceConfig,
        audio: Arc<dyn AudioCapabilityProvider>,
        transport: Arc<dyn TransportProvider>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let client = VoiceClient::new(transport, config.transport.clone());
        let mic = MicSession::new(Arc::clone(&audio));
        Self {
            config,
            audio,
            tokens,
            client,
            mic,
            scheduler: None,
            pump: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Connect, perform the `auth`/`start` handshake, and begin streaming
    /// microphone audio.
    ///
    /// # Errors
    ///
    /// Fails fast with `Unauthenticated` before touching the network,
    /// with the connect outcome errors, or with device/capability errors
    /// from the audio provider. Partial setup is torn down on failure.
    pub async fn begin(&mut self, ctx: &SessionContext, handlers: SessionHandlers) -> Result<()> {
        match self.try_begin(ctx, handlers).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shutdown();
                Err(e)
            }
        }
    }

    async fn try_begin(&mut self, ctx: &SessionContext, handlers: SessionHandlers) -> Result<()> {
        let token = self.tokens.bearer_token()?;

        let sink = self
            .audio
            .open_playback(self.config.audio.playback_sample_rate)?;
        let mut scheduler = PlaybackScheduler::new(
            sink,
            self.config.audio.playback_sample_rate,
            Duration::from_millis(self.config.audio.lookahead_ms),
        )?;

        // Echo cancellation runs at the capture device rate, fed by the
        // scheduler's reference tap.
        let aec = if self.config.audio.aec.enabled {
            let native_rate = self.audio.input_sample_rate()?;
            let reference =
                ReferenceBuffer::new(self.config.audio.playback_sample_rate, native_rate);
            scheduler.set_reference(reference.handle());
            Some(EchoCanceller::new(&self.config.audio.aec, reference)?)
        } else {
            None
        };

        let scheduler = Arc::new(Mutex::new(scheduler));
        self.scheduler = Some(Arc::clone(&scheduler));

        let playback = Arc::clone(&scheduler);
        let interrupt = Arc::clone(&scheduler);
        let voice_handlers = VoiceHandlers {
            on_event: handlers.on_event,
            on_audio: Box::new(move |pcm| {
                let mut sched = match playback.lock() {
                    Ok(s) => s,
                    Err(p) => p.into_inner(),
                };
                if let Err(e) = sched.play_chunk(&pcm) {
                    warn!("dropping inbound audio frame: {e}");
                }
            }),
            on_error: Box::new(move |e| {
                warn!("voice session error: {e}");
                let mut sched = match interrupt.lock() {
                    Ok(s) => s,
                    Err(p) => p.into_inner(),
                };
                sched.stop();
            }),
        };

        self.client.connect(voice_handlers, &self.cancel).await?;

        self.client.send(&ClientMessage::Auth {
            token,
            book_id: ctx.book_id.clone(),
            chapter_id: ctx.chapter_id.clone(),
            page_id: ctx.page_id.clone(),
        })?;
        self.client.send(&ClientMessage::Start {
            input_audio: AudioFormat::pcm_s16le(self.config.audio.capture_sample_rate),
            output_audio: AudioFormat::pcm_s16le(self.config.audio.playback_sample_rate),
            voice: VoiceSelection {
                provider: self.config.transport.voice_provider.clone(),
                voice_id: self.config.transport.voice_id.clone(),
            },
            mode: "conversation".to_owned(),
        })?;

        let (tx, mut rx) = mpsc::channel::<CaptureFrame>(CAPTURE_CHANNEL_DEPTH);
        self.mic
            .start(self.config.audio.capture_sample_rate, aec, tx)?;

        let client = self.client.clone();
        let mut on_level = handlers.on_level;
        self.pump = Some(tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Some(level) = on_level.as_mut() {
                    level(frame.rms);
                }
                if client.send_audio(frame.pcm).is_err() {
                    break;
                }
            }
        }));

        info!(
            book = %ctx.book_id,
            chapter = %ctx.chapter_id,
            page = %ctx.page_id,
            "voice session started"
        );
        Ok(())
    }

    /// Mark the start of a user utterance.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the session is not open.
    pub fn speech_start(&self) -> Result<()> {
        self.client.send(&ClientMessage::SpeechStart {})
    }

    /// Mark the end of a user utterance.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the session is not open.
    pub fn speech_end(&self) -> Result<()> {
        self.client.send(&ClientMessage::SpeechEnd {})
    }

    /// Request orderly session termination, then release local resources.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the session is not open; local
    /// teardown still runs.
    pub fn end(&mut self) -> Result<()> {
        let sent = self.client.send(&ClientMessage::End {});
        self.shutdown();
        sent
    }

    /// Abandon the session: tell the service, halt pending playback so
    /// stale audio never sounds, and release everything.
    pub fn cancel(&mut self) {
        let _ = self.client.send(&ClientMessage::Cancel {});
        if let Some(scheduler) = &self.scheduler {
            let mut sched = match scheduler.lock() {
                Ok(s) => s,
                Err(p) => p.into_inner(),
            };
            sched.stop();
        }
        self.shutdown();
    }

    /// Whether the underlying connection is open.
    pub fn is_open(&self) -> bool {
        self.client.state() == SessionState::Open
    }

    /// Release the device, connection, and playback path. Safe to call
    /// repeatedly and on error paths.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.mic.stop();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.client.close();
        if let Some(scheduler) = self.scheduler.take() {
            let mut sched = match scheduler.lock() {
                Ok(s) => s,
                Err(p) => p.into_inner(),
            };
            sched.close();
        }
        // A fresh token for the next begin().
        self.cancel = CancellationToken::new();
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
