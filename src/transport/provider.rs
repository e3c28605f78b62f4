//! Injected transport seam for the voice connection.
//!
//! The transport client never names a socket type directly; it connects
//! through [`TransportProvider`] and talks to a [`DuplexStream`], so the
//! protocol state machine is testable without a network. [`WsTransport`]
//! is the production WebSocket implementation.

use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// One inbound frame from the duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A JSON control message.
    Text(String),
    /// An untagged binary PCM frame.
    Binary(Vec<u8>),
    /// The remote closed the stream.
    Closed,
}

/// An established ordered duplex stream carrying text and binary frames.
#[async_trait]
pub trait DuplexStream: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;
    /// Send a binary frame.
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<()>;
    /// Receive the next frame; `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> Option<Result<WireFrame>>;
    /// Close the stream. Best effort.
    async fn close(&mut self) -> Result<()>;
}

/// Connection factory for the voice service.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Establish one duplex stream to the given address.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Transport`] when the remote refuses or the
    /// connection cannot be established.
    async fn connect(&self, url: &str) -> Result<Box<dyn DuplexStream>>;
}

/// Production WebSocket transport via tokio-tungstenite.
pub struct WsTransport;

#[async_trait]
impl TransportProvider for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn DuplexStream>> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| VoiceError::Transport(format!("connect: {e}")))?;
        Ok(Box::new(WsStream { inner: stream }))
    }
}

struct WsStream {
    inner: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl DuplexStream for WsStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| VoiceError::Transport(format!("send: {e}")))
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.inner
            .send(Message::Binary(data))
            .await
            .map_err(|e| VoiceError::Transport(format!("send: {e}")))
    }

    async fn next_frame(&mut self) -> Option<Result<WireFrame>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(WireFrame::Text(text))),
                Ok(Message::Binary(data)) => Some(Ok(WireFrame::Binary(data))),
                Ok(Message::Close(_)) => Some(Ok(WireFrame::Closed)),
                // Ping/pong and raw frames are tungstenite's concern.
                Ok(_) => continue,
                Err(e) => Some(Err(VoiceError::Transport(format!("read: {e}")))),
            };
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .close(None)
            .await
            .map_err(|e| VoiceError::Transport(format!("close: {e}")))
    }
}
