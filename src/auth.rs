//! Authentication collaborator seam.
//!
//! Both the voice transport and the content stream authenticate with a
//! short-lived bearer token supplied on demand by the surrounding
//! application. The provider is injected so the clients stay testable
//! without a live identity service.

use crate::error::{Result, VoiceError};

/// Supplies a short-lived bearer token on demand.
pub trait TokenProvider: Send + Sync {
    /// Produce the current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Unauthenticated`] when no active identity
    /// is available.
    fn bearer_token(&self) -> Result<String>;
}

/// A fixed-token provider for wiring and tests.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    /// Provider that always yields the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider with no identity — every request fails fast.
    pub fn unauthenticated() -> Self {
        Self { token: None }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Result<String> {
        self.token.clone().ok_or(VoiceError::Unauthenticated)
    }
}
