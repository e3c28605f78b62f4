//! Error types for the voice interaction pipeline.

/// Top-level error type for the voice/content streaming client.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Required platform audio facility is missing. Fatal — no retry.
    #[error("audio capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Microphone permission denied or no input device present.
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Connection establishment exceeded the configured bound.
    #[error("connect timed out")]
    ConnectTimeout,

    /// An in-flight connect attempt was cancelled by the caller.
    #[error("connect cancelled")]
    ConnectCancelled,

    /// Transport-level failure (refused connection, broken stream).
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected protocol payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No active identity — a bearer token could not be produced.
    #[error("unauthenticated: no active identity")]
    Unauthenticated,

    /// Non-success response from the content-generation endpoint.
    #[error("stream request failed: {0}")]
    StreamRequest(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
