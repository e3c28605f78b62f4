//! Shared fakes for integration tests: a scriptable transport provider
//! and a recording playback sink.

#![allow(dead_code)]

use async_trait::async_trait;
use hearth_voice::audio::provider::PlaybackSink;
use hearth_voice::error::{Result, VoiceError};
use hearth_voice::transport::provider::{DuplexStream, TransportProvider, WireFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What one frame the client sent looked like on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Test-side handle to a scripted connection: push inbound frames in,
/// observe what the client sent out.
pub struct StreamHandle {
    pub inbound: mpsc::UnboundedSender<Result<WireFrame>>,
    pub sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl StreamHandle {
    pub fn push_text(&self, json: &str) {
        self.inbound
            .send(Ok(WireFrame::Text(json.to_owned())))
            .expect("connection task gone");
    }

    pub fn push_binary(&self, data: Vec<u8>) {
        self.inbound
            .send(Ok(WireFrame::Binary(data)))
            .expect("connection task gone");
    }

    pub fn push_closed(&self) {
        let _ = self.inbound.send(Ok(WireFrame::Closed));
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.sent.lock().expect("sent lock").clone()
    }
}

struct ScriptedStream {
    inbound: mpsc::UnboundedReceiver<Result<WireFrame>>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

#[async_trait]
impl DuplexStream for ScriptedStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().expect("sent lock").push(SentFrame::Text(text));
        Ok(())
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push(SentFrame::Binary(data));
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<WireFrame>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.sent.lock().expect("sent lock").push(SentFrame::Close);
        Ok(())
    }
}

enum ConnectOutcome {
    Accept(ScriptedStream),
    Refuse(String),
    Hang,
}

/// Transport provider with a scripted connect outcome and a call counter.
pub struct MockTransport {
    connects: AtomicUsize,
    outcome: Mutex<Option<ConnectOutcome>>,
}

impl MockTransport {
    /// Provider whose first connect succeeds with a scripted stream.
    pub fn accepting() -> (Arc<Self>, StreamHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = ScriptedStream {
            inbound: rx,
            sent: Arc::clone(&sent),
        };
        let provider = Arc::new(Self {
            connects: AtomicUsize::new(0),
            outcome: Mutex::new(Some(ConnectOutcome::Accept(stream))),
        });
        (provider, StreamHandle { inbound: tx, sent })
    }

    /// Provider that refuses every connect.
    pub fn refusing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            outcome: Mutex::new(Some(ConnectOutcome::Refuse(reason.to_owned()))),
        })
    }

    /// Provider whose connect never completes.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            outcome: Mutex::new(Some(ConnectOutcome::Hang)),
        })
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportProvider for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn DuplexStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().expect("outcome lock").take();
        match outcome {
            Some(ConnectOutcome::Accept(stream)) => Ok(Box::new(stream)),
            Some(ConnectOutcome::Refuse(reason)) => Err(VoiceError::Transport(reason)),
            Some(ConnectOutcome::Hang) | None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// What a playback sink was asked to do, shared with the test body.
#[derive(Default)]
pub struct SinkLog {
    pub written: Vec<Vec<f32>>,
    pub clears: usize,
    pub closes: usize,
}

/// Playback sink that records writes instead of playing them.
pub struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl PlaybackSink for RecordingSink {
    fn write(&mut self, samples: &[f32]) {
        self.log
            .lock()
            .expect("sink lock")
            .written
            .push(samples.to_vec());
    }

    fn clear(&mut self) {
        self.log.lock().expect("sink lock").clears += 1;
    }

    fn close(&mut self) {
        self.log.lock().expect("sink lock").closes += 1;
    }
}
