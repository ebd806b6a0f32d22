//! Recording configuration value object

use crate::domain::error::InvalidRecordConfig;

use super::encoder::AudioEncoder;

/// Default capture sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Highest capture sample rate accepted, in Hz
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Default channel count
pub const DEFAULT_CHANNELS: u16 = 2;

/// Default target bit rate in bits per second
pub const DEFAULT_BIT_RATE: u32 = 128_000;

/// Caller-supplied parameters for one recording session.
///
/// Owned by the session for its whole lifetime and replaced wholesale on the
/// next start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConfig {
    pub encoder: AudioEncoder,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub bit_rate: u32,
    /// Capture device identifier; `None` selects the default input
    pub device_id: Option<String>,
}

impl RecordConfig {
    /// Create a config for the given encoder with default format parameters
    pub fn new(encoder: AudioEncoder) -> Self {
        Self {
            encoder,
            ..Self::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, num_channels: u16) -> Self {
        self.num_channels = num_channels;
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Select a capture device. An empty id means the default device.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        let id = device_id.into();
        self.device_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }

    /// Check the numeric ranges
    pub fn validate(&self) -> Result<(), InvalidRecordConfig> {
        if self.sample_rate == 0 {
            return Err(InvalidRecordConfig::ZeroSampleRate);
        }
        if self.sample_rate > MAX_SAMPLE_RATE {
            return Err(InvalidRecordConfig::SampleRateTooHigh(self.sample_rate));
        }
        if !(1..=2).contains(&self.num_channels) {
            return Err(InvalidRecordConfig::ChannelCount(self.num_channels));
        }
        if self.bit_rate == 0 {
            return Err(InvalidRecordConfig::ZeroBitRate);
        }
        Ok(())
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            encoder: AudioEncoder::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            num_channels: DEFAULT_CHANNELS,
            bit_rate: DEFAULT_BIT_RATE,
            device_id: None,
        }
    }
}
