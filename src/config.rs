//! Configuration types for the voice interaction client.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default production voice service address.
const PROD_VOICE_URL: &str = "wss://voice.hearth-journal.app/session";
/// Default production content-generation endpoint.
const PROD_CONTENT_URL: &str = "https://api.hearth-journal.app/generate";
/// Local development voice service address.
const DEV_VOICE_URL: &str = "ws://127.0.0.1:8787/session";
/// Local development content-generation endpoint.
const DEV_CONTENT_URL: &str = "http://127.0.0.1:8788/generate";

/// Top-level configuration for the voice client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Voice transport connection settings.
    pub transport: TransportConfig,
    /// Content stream settings.
    pub content: ContentConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz sent to the voice service.
    pub capture_sample_rate: u32,
    /// Playback sample rate in Hz, negotiated at session start.
    pub playback_sample_rate: u32,
    /// Scheduling lookahead in ms absorbing playback timing jitter.
    pub lookahead_ms: u64,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Echo cancellation on the capture path.
    pub aec: AecConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            lookahead_ms: 50,
            input_device: None,
            aec: AecConfig::default(),
        }
    }
}

/// Acoustic echo cancellation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AecConfig {
    /// Whether DSP-based echo cancellation is enabled.
    pub enabled: bool,
    /// FFT size for the FDAF adaptive filter (must be a power of two).
    ///
    /// Frame size = fft_size / 2.
    pub fft_size: usize,
    /// NLMS learning rate for the adaptive filter.
    ///
    /// Typical range: 0.01-0.5. Lower values are more stable but adapt
    /// slower.
    pub step_size: f32,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fft_size: 1024,
            step_size: 0.05,
        }
    }
}

/// Voice transport connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket URL of the voice service.
    pub voice_url: String,
    /// Connection establishment bound in ms.
    pub connect_timeout_ms: u64,
    /// TTS voice provider name sent in the session handshake.
    pub voice_provider: String,
    /// TTS voice identifier sent in the session handshake.
    pub voice_id: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            voice_url: PROD_VOICE_URL.to_owned(),
            connect_timeout_ms: 10_000,
            voice_provider: "narrator".to_owned(),
            voice_id: "warm-reader".to_owned(),
        }
    }
}

/// Content stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// HTTPS endpoint of the content-generation service.
    pub generate_url: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            generate_url: PROD_CONTENT_URL.to_owned(),
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build a configuration with service endpoints selected from the
    /// `HEARTH_ENV` environment variable.
    ///
    /// Any value other than `"development"` (or `"dev"`) selects the
    /// production endpoints. This selection is configuration only — the
    /// client itself never inspects the environment.
    pub fn from_env() -> Self {
        let dev = matches!(
            std::env::var("HEARTH_ENV").as_deref(),
            Ok("development") | Ok("dev")
        );
        let mut config = Self::default();
        if dev {
            config.transport.voice_url = DEV_VOICE_URL.to_owned();
            config.content.generate_url = DEV_CONTENT_URL.to_owned();
        }
        config
    }
}
