//! Content-generation stream: request types, event parser, and client.

pub mod client;
pub mod sse;

pub use client::{ChatMessage, ContentCallbacks, ContentStreamClient, GenerateRequest};
pub use sse::{EventStreamParser, StreamEvent};
