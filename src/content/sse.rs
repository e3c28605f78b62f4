//! Incremental parser for the content-generation event stream.
//!
//! The service delivers named events as newline-framed text blocks
//! separated by a blank line:
//!
//! ```text
//! event: chunk
//! data: {"text":"Once upon"}
//!
//! data: {"text":" a time"}
//! ```
//!
//! Carriage returns are stripped, a missing `event:` line defaults to
//! `"message"`, multiple `data:` lines are joined with `\n`, and a data
//! payload that fails JSON decoding degrades to `{"text": raw}` rather
//! than aborting the stream.

/// One decoded content-stream event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Event name (`chunk`, `outline`, `page_start`, ... or an extension).
    pub event: String,
    /// Decoded payload, or `{"text": raw}` when the body was not JSON.
    pub data: serde_json::Value,
}

/// Incremental event-stream parser.
///
/// Feed response bytes via [`EventStreamParser::push`]; complete events
/// come back in strict arrival order. Call [`EventStreamParser::flush`]
/// at end-of-stream to emit a trailing unterminated block.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: String,
    /// Incomplete trailing UTF-8 sequence awaiting its continuation
    /// bytes from the next chunk.
    partial: Vec<u8>,
}

impl EventStreamParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of response bytes and drain any completed events.
    ///
    /// Chunks may split anywhere, including inside a multi-byte UTF-8
    /// character; the undecodable suffix is held back until the next
    /// chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.partial.extend_from_slice(chunk);
        let keep = incomplete_suffix_len(&self.partial);
        let complete = &self.partial[..self.partial.len() - keep];
        let text = String::from_utf8_lossy(complete);
        // Strip carriage returns up front so `\r\n\r\n` framing collapses
        // to the `\n\n` delimiter.
        for ch in text.chars() {
            if ch != '\r' {
                self.buffer.push(ch);
            }
        }
        self.partial.drain(..self.partial.len() - keep);

        let mut events = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..idx + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Emit any trailing block buffered when the stream ended without a
    /// final delimiter.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        // A dangling partial sequence at end-of-stream is truly invalid.
        let partial = std::mem::take(&mut self.partial);
        for ch in String::from_utf8_lossy(&partial).chars() {
            if ch != '\r' {
                self.buffer.push(ch);
            }
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&rest)
    }
}

/// Length of an incomplete UTF-8 sequence at the end of `bytes`, or 0
/// when the bytes either decode fully or end in outright invalid data.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) => match e.error_len() {
            // No error length means the input just ended mid-sequence.
            None => bytes.len() - e.valid_up_to(),
            Some(_) => 0,
        },
    }
}

/// Parse one delimited block into an event, if it carries any fields.
fn parse_block(block: &str) -> Option<StreamEvent> {
    let mut event_name: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = field_value(line, "event") {
            event_name = Some(value.to_owned());
        } else if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        }
    }

    if event_name.is_none() && data_lines.is_empty() {
        return None;
    }

    let raw = data_lines.join("\n");
    Some(StreamEvent {
        event: event_name.unwrap_or_else(|| "message".to_owned()),
        data: decode_data(&raw),
    })
}

/// Extract the value of `field:` from a line, stripping one leading space.
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Decode a data payload, degrading to `{"text": raw}` on failure.
fn decode_data(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "text": raw }))
}
