//! Domain error types

use thiserror::Error;

use crate::domain::recording::MAX_SAMPLE_RATE;

/// Error when parsing a time limit string
#[derive(Debug, Clone, Error)]
#[error("Invalid time limit: \"{input}\". Expected format: <number>ms, <number>s, <number>m, or <number>m<number>s (e.g., 500ms, 30s, 2m30s)")]
pub struct TimeLimitParseError {
    pub input: String,
}

/// Error when an unknown encoder name is provided
#[derive(Debug, Clone, Error)]
#[error("Invalid encoder: \"{input}\". Valid encoders are: aacLc, aacHe, amrNb, amrWb, opus, flac, pcm16bits, wav")]
pub struct EncoderParseError {
    pub input: String,
}

/// Error when a recording configuration is out of range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecordConfig {
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("sample rate must be at most {max} Hz, got {0}", max = MAX_SAMPLE_RATE)]
    SampleRateTooHigh(u32),

    #[error("channel count must be 1 or 2, got {0}")]
    ChannelCount(u16),

    #[error("bit rate must be greater than zero")]
    ZeroBitRate,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}
