//! Application configuration value object

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::recording::{
    AudioEncoder, BackendKind, RecordConfig, DEFAULT_BIT_RATE, DEFAULT_CHANNELS,
    DEFAULT_SAMPLE_RATE,
};

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub encoder: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bit_rate: Option<u32>,
    pub device: Option<String>,
    pub backend: Option<String>,
    pub helper_path: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            encoder: Some(AudioEncoder::Wav.as_str().to_string()),
            sample_rate: Some(DEFAULT_SAMPLE_RATE),
            channels: Some(DEFAULT_CHANNELS),
            bit_rate: Some(DEFAULT_BIT_RATE),
            device: None,
            backend: Some(BackendKind::Native.as_str().to_string()),
            helper_path: None,
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            encoder: other.encoder.or(self.encoder),
            sample_rate: other.sample_rate.or(self.sample_rate),
            channels: other.channels.or(self.channels),
            bit_rate: other.bit_rate.or(self.bit_rate),
            device: other.device.or(self.device),
            backend: other.backend.or(self.backend),
            helper_path: other.helper_path.or(self.helper_path),
        }
    }

    /// Get encoder, or WAV if not set/invalid
    pub fn encoder_or_default(&self) -> AudioEncoder {
        self.encoder
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(AudioEncoder::Wav)
    }

    /// Get backend, or native if not set/invalid
    pub fn backend_or_default(&self) -> BackendKind {
        self.backend
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Explicit helper executable, if configured
    pub fn helper_path(&self) -> Option<PathBuf> {
        self.helper_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Build the session config described by this file
    pub fn record_config(&self) -> RecordConfig {
        let mut config = RecordConfig::new(self.encoder_or_default())
            .with_sample_rate(self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE))
            .with_channels(self.channels.unwrap_or(DEFAULT_CHANNELS))
            .with_bit_rate(self.bit_rate.unwrap_or(DEFAULT_BIT_RATE));
        if let Some(device) = &self.device {
            config = config.with_device(device.clone());
        }
        config
    }
}
