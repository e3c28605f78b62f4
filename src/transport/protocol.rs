//! Voice session protocol messages.
//!
//! JSON text frames, discriminated by a `type` field, interleaved with
//! untagged binary PCM frames on one ordered duplex stream. Each
//! direction is a closed tagged-variant type so the dispatch sites stay
//! exhaustive.

use serde::{Deserialize, Serialize};

/// Immutable application context for one voice connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Journal book being narrated.
    pub book_id: String,
    /// Chapter within the book.
    pub chapter_id: String,
    /// Page the session is anchored to.
    pub page_id: String,
}

/// PCM stream shape declared once during session negotiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Encoding name, e.g. `pcm_s16le`.
    pub format: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (mono throughout this system).
    pub channels: u16,
}

impl AudioFormat {
    /// Mono signed 16-bit little-endian PCM at the given rate.
    pub fn pcm_s16le(sample_rate: u32) -> Self {
        Self {
            format: "pcm_s16le".to_owned(),
            sample_rate,
            channels: 1,
        }
    }
}

/// Synthesized voice selection for the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    /// Synthesis provider name.
    pub provider: String,
    /// Provider-specific voice identifier.
    pub voice_id: String,
}

/// Outbound control messages (client to voice service).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session authentication, sent first.
    #[serde(rename_all = "camelCase")]
    Auth {
        token: String,
        book_id: String,
        chapter_id: String,
        page_id: String,
    },
    /// Format negotiation, sent after `auth`.
    #[serde(rename_all = "camelCase")]
    Start {
        input_audio: AudioFormat,
        output_audio: AudioFormat,
        voice: VoiceSelection,
        mode: String,
    },
    /// The user began speaking; binary frames follow.
    SpeechStart {},
    /// The user stopped speaking.
    SpeechEnd {},
    /// Keepalive with a client timestamp.
    Ping { t: u64 },
    /// Orderly session termination.
    End {},
    /// Abandon the session immediately.
    Cancel {},
}

/// Inbound control messages (voice service to client).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake accepted; the session is live.
    #[serde(rename_all = "camelCase")]
    Ready {
        #[serde(default)]
        session_id: String,
    },
    /// Interim recognition of in-progress speech.
    PartialTranscript { text: String },
    /// Committed recognition of a finished utterance.
    FinalTranscript { text: String },
    /// Assistant reply text paired with the synthesized audio frames.
    #[serde(rename_all = "camelCase")]
    AssistantText {
        text: String,
        #[serde(default)]
        message_id: String,
    },
    /// Remote-reported failure.
    Error {
        #[serde(default)]
        code: String,
        message: String,
    },
}
