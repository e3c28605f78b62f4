//! Voice session transport: protocol types, connection seam, and the
//! client state machine.

pub mod client;
pub mod protocol;
pub mod provider;

pub use client::{SessionState, VoiceClient, VoiceHandlers};
pub use protocol::{
    AudioFormat, ClientMessage, ServerMessage, SessionContext, VoiceSelection,
};
pub use provider::{DuplexStream, TransportProvider, WireFrame, WsTransport};
