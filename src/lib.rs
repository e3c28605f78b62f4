//! Hearth voice: real-time voice interaction and content streaming for the
//! Hearth family journal.
//!
//! This crate provides the client-side streaming core:
//! Microphone → resample → WebSocket voice service → playback scheduler,
//! plus an independent SSE client for the content-generation endpoint.
//!
//! # Architecture
//!
//! The pieces are independent and connected by async channels:
//! - **Audio capture**: Records from the microphone via `cpal`, downsampling
//!   to the negotiated rate with a stateful linear-interpolation resampler
//! - **Voice transport**: Duplex WebSocket session carrying JSON control
//!   frames and raw PCM binary frames
//! - **Playback**: Gapless scheduling of inbound synthesized audio chunks
//! - **Content stream**: Authenticated SSE consumption of generated journal
//!   content, independent of the voice session
//!
//! Device and network access sit behind injected capability traits
//! ([`audio::AudioCapabilityProvider`], [`transport::TransportProvider`],
//! [`auth::TokenProvider`]) so the core logic is testable without hardware.

pub mod audio;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod session;
pub mod transport;

pub use audio::{CaptureFrame, LinearResampler, MicSession, PlaybackScheduler, ResampledBlock};
pub use auth::{StaticTokenProvider, TokenProvider};
pub use config::VoiceConfig;
pub use content::{ContentCallbacks, ContentStreamClient, EventStreamParser, StreamEvent};
pub use error::{Result, VoiceError};
pub use session::{SessionHandlers, VoiceSession};
pub use transport::protocol::{ClientMessage, ServerMessage, SessionContext};
pub use transport::{SessionState, VoiceClient, VoiceHandlers};
