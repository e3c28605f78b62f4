//! Voice transport client.
//!
//! Owns one persistent duplex connection per logical voice session and
//! enforces connection lifecycle correctness: at most one connect attempt
//! in flight, bounded connect time, deterministic cancellation, and
//! idempotent close. Inbound JSON control frames and binary audio frames
//! are demultiplexed to subscriber callbacks.

use crate::config::TransportConfig;
use crate::error::{Result, VoiceError};
use crate::transport::protocol::{ClientMessage, ServerMessage};
use crate::transport::provider::{DuplexStream, TransportProvider, WireFrame};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of one logical voice session connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection has been attempted.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The connection is established and frames flow.
    Open,
    /// Closed by the client; a new `connect` may follow.
    Closed,
    /// The transport failed while connecting or open.
    Error,
}

/// Subscriber callbacks for demultiplexed inbound traffic.
pub struct VoiceHandlers {
    /// Parsed inbound control messages.
    pub on_event: Box<dyn FnMut(ServerMessage) + Send>,
    /// Inbound binary PCM frames, uninterpreted.
    pub on_audio: Box<dyn FnMut(Vec<u8>) + Send>,
    /// Transport failures after the connection opened.
    pub on_error: Box<dyn FnMut(VoiceError) + Send>,
}

impl Default for VoiceHandlers {
    fn default() -> Self {
        Self {
            on_event: Box::new(|_| {}),
            on_audio: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }
}

enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

struct Inner {
    state: SessionState,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
}

/// Client side of the voice session protocol.
///
/// Exactly one instance should be open per logical voice session; the
/// protocol does not multiplex sessions over one connection.
#[derive(Clone)]
pub struct VoiceClient {
    provider: Arc<dyn TransportProvider>,
    config: TransportConfig,
    inner: Arc<Mutex<Inner>>,
}

impl VoiceClient {
    /// Create a client over the given transport provider.
    pub fn new(provider: Arc<dyn TransportProvider>, config: TransportConfig) -> Self {
        Self {
            provider,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                outbound: None,
            })),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Establish the connection and start the demultiplexing loop.
    ///
    /// A no-op when already connecting or open. Exactly one of four
    /// outcomes occurs per attempt: open, [`VoiceError::ConnectTimeout`]
    /// at the configured bound, [`VoiceError::ConnectCancelled`] when the
    /// token fires first, or a [`VoiceError::Transport`] refusal.
    ///
    /// # Errors
    ///
    /// The failure outcomes above; each leaves the client reconnectable.
    pub async fn connect(&self, handlers: VoiceHandlers, cancel: &CancellationToken) -> Result<()> {
        {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Connecting | SessionState::Open => {
                    debug!("connect ignored: attempt already in flight or open");
                    return Ok(());
                }
                _ => inner.state = SessionState::Connecting,
            }
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let attempt = tokio::select! {
            result = self.provider.connect(&self.config.voice_url) => result,
            () = tokio::time::sleep(timeout) => Err(VoiceError::ConnectTimeout),
            () = cancel.cancelled() => Err(VoiceError::ConnectCancelled),
        };

        match attempt {
            Ok(stream) => {
                let (tx, rx) = mpsc::unbounded_channel();
                {
                    let mut inner = self.lock();
                    inner.state = SessionState::Open;
                    inner.outbound = Some(tx);
                }
                let inner = Arc::clone(&self.inner);
                tokio::spawn(run_loop(stream, rx, handlers, inner));
                info!("voice session open: {}", self.config.voice_url);
                Ok(())
            }
            Err(e) => {
                // Dropping the pending connect future forces the close.
                let mut inner = self.lock();
                inner.state = SessionState::Error;
                inner.outbound = None;
                warn!("voice connect failed: {e}");
                Err(e)
            }
        }
    }

    /// Send one control message.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Transport`] when the session is not open.
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| VoiceError::Protocol(format!("encode: {e}")))?;
        self.send_outbound(Outbound::Text(json))
    }

    /// Send one binary PCM capture frame.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Transport`] when the session is not open.
    pub fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        self.send_outbound(Outbound::Binary(pcm))
    }

    /// Close the connection and clear internal state so a subsequent
    /// `connect` can succeed. Safe to call repeatedly, including after a
    /// transport error.
    pub fn close(&self) {
        let mut inner = self.lock();
        if let Some(tx) = inner.outbound.take() {
            let _ = tx.send(Outbound::Close);
            info!("voice session closing");
        }
        inner.state = SessionState::Closed;
    }

    fn send_outbound(&self, frame: Outbound) -> Result<()> {
        let inner = self.lock();
        if inner.state != SessionState::Open {
            return Err(VoiceError::Transport("session not open".into()));
        }
        inner
            .outbound
            .as_ref()
            .ok_or_else(|| VoiceError::Transport("session not open".into()))?
            .send(frame)
            .map_err(|_| VoiceError::Channel("connection task gone".into()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Demultiplex inbound frames and drain outbound commands until the
/// connection ends one way or the other.
async fn run_loop(
    mut stream: Box<dyn DuplexStream>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut handlers: VoiceHandlers,
    inner: Arc<Mutex<Inner>>,
) {
    loop {
        tokio::select! {
            frame = stream.next_frame() => match frame {
                Some(Ok(WireFrame::Text(text))) => dispatch_text(&text, &mut handlers),
                Some(Ok(WireFrame::Binary(data))) => (handlers.on_audio)(data),
                Some(Ok(WireFrame::Closed)) | None => {
                    abrupt_close(&inner, &mut handlers, "connection closed by remote");
                    break;
                }
                Some(Err(e)) => {
                    abrupt_close(&inner, &mut handlers, &e.to_string());
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(json)) => {
                    if let Err(e) = stream.send_text(json).await {
                        abrupt_close(&inner, &mut handlers, &e.to_string());
                        break;
                    }
                }
                Some(Outbound::Binary(data)) => {
                    if let Err(e) = stream.send_binary(data).await {
                        abrupt_close(&inner, &mut handlers, &e.to_string());
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = stream.close().await;
                    debug!("voice session closed");
                    break;
                }
            },
        }
    }
}

/// Parse and dispatch one inbound text frame.
///
/// Malformed JSON is dropped silently — keepalive noise must not crash
/// the session.
fn dispatch_text(text: &str, handlers: &mut VoiceHandlers) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => (handlers.on_event)(message),
        Err(e) => debug!("ignoring unparseable voice frame: {e}"),
    }
}

/// Record a post-open transport failure and notify the subscriber.
///
/// Reconnection is the caller's explicit responsibility — a new
/// `connect` call, never automatic.
fn abrupt_close(inner: &Arc<Mutex<Inner>>, handlers: &mut VoiceHandlers, reason: &str) {
    let was_client_close = {
        let mut guard = match inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let client_closed = guard.state == SessionState::Closed;
        if !client_closed {
            guard.state = SessionState::Error;
        }
        guard.outbound = None;
        client_closed
    };
    if !was_client_close {
        warn!("voice transport failed: {reason}");
        (handlers.on_error)(VoiceError::Transport(reason.to_owned()));
    }
}
