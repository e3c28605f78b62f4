//! Content stream client.
//!
//! Issues one authenticated request to the content-generation endpoint
//! and decodes the incrementally-delivered response into typed events,
//! dispatched to the matching named callback plus a catch-all, in strict
//! arrival order. Independent of the voice transport — the two share
//! only the token source.

use crate::auth::TokenProvider;
use crate::config::ContentConfig;
use crate::content::sse::{EventStreamParser, StreamEvent};
use crate::error::{Result, VoiceError};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One chat message in the generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Request body for the content-generation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Whether the service should pick the subject itself.
    pub is_surprise: bool,
    /// Optional authoring action, e.g. `rewrite`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Journal book the content belongs to.
    pub book_id: String,
    /// Chapter within the book.
    pub chapter_id: String,
    /// Generation mode.
    pub mode: String,
}

/// Handler for one named event's decoded payload.
pub type EventHandler = Box<dyn FnMut(&serde_json::Value) + Send>;

/// Per-event callbacks plus the unconditional catch-all.
///
/// Unset named callbacks simply skip that dispatch; the catch-all still
/// sees every event, including unrecognized names.
#[derive(Default)]
pub struct ContentCallbacks {
    /// Incremental text.
    pub on_chunk: Option<EventHandler>,
    /// Book/chapter outline.
    pub on_outline: Option<EventHandler>,
    /// A page began generating.
    pub on_page_start: Option<EventHandler>,
    /// Incremental text scoped to one page.
    pub on_page_chunk: Option<EventHandler>,
    /// A page finished generating.
    pub on_page_done: Option<EventHandler>,
    /// A page failed.
    pub on_page_error: Option<EventHandler>,
    /// The whole generation completed.
    pub on_done: Option<EventHandler>,
    /// The generation failed remotely.
    pub on_error: Option<EventHandler>,
    /// Catch-all invoked for every event, after the named callback.
    pub on_event: Option<Box<dyn FnMut(&StreamEvent) + Send>>,
}

/// Client for the streamed content-generation endpoint.
pub struct ContentStreamClient {
    http: reqwest::Client,
    config: ContentConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl ContentStreamClient {
    /// Create a client over the given endpoint and token source.
    pub fn new(config: ContentConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    /// Issue the request and dispatch events until the stream ends.
    ///
    /// # Errors
    ///
    /// Fails fast with [`VoiceError::Unauthenticated`] when no token is
    /// available, and with [`VoiceError::StreamRequest`] carrying the
    /// response's error body on a non-success status — no partial event
    /// processing occurs in that case. Individual undecodable event
    /// bodies degrade to raw text and never abort the stream.
    pub async fn stream(
        &self,
        request: &GenerateRequest,
        callbacks: &mut ContentCallbacks,
    ) -> Result<()> {
        let token = self.tokens.bearer_token()?;

        let response = self
            .http
            .post(&self.config.generate_url)
            .header("Authorization", format!("Bearer {token}"))
            .json(request)
            .send()
            .await
            .map_err(|e| VoiceError::StreamRequest(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            };
            return Err(VoiceError::StreamRequest(detail));
        }

        info!("content stream open: {}", self.config.generate_url);

        let mut byte_stream = response.bytes_stream();
        let mut parser = EventStreamParser::new();
        let mut dispatched = 0usize;

        while let Some(chunk) = byte_stream.next().await {
            let chunk =
                chunk.map_err(|e| VoiceError::StreamRequest(format!("body read failed: {e}")))?;
            for event in parser.push(&chunk) {
                dispatch(&event, callbacks);
                dispatched += 1;
            }
        }
        if let Some(event) = parser.flush() {
            dispatch(&event, callbacks);
            dispatched += 1;
        }

        debug!("content stream complete: {dispatched} event(s)");
        Ok(())
    }
}

/// Route one event to its named callback, then the catch-all.
fn dispatch(event: &StreamEvent, callbacks: &mut ContentCallbacks) {
    let named = match event.event.as_str() {
        "chunk" => callbacks.on_chunk.as_mut(),
        "outline" => callbacks.on_outline.as_mut(),
        "page_start" => callbacks.on_page_start.as_mut(),
        "page_chunk" => callbacks.on_page_chunk.as_mut(),
        "page_done" => callbacks.on_page_done.as_mut(),
        "page_error" => callbacks.on_page_error.as_mut(),
        "done" => callbacks.on_done.as_mut(),
        "error" => callbacks.on_error.as_mut(),
        _ => None,
    };
    if let Some(handler) = named {
        handler(&event.data);
    }
    if let Some(handler) = callbacks.on_event.as_mut() {
        handler(event);
    }
}
