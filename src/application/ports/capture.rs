//! Capture framework port interfaces
//!
//! The native engine talks to the audio device through these traits. A
//! platform hands out sources, a source hands out a blocking sample stream,
//! and the engine drives that stream through its asynchronous reader.

use std::fmt;
use std::time::Duration;

use crate::application::ports::recorder::RecorderError;
use crate::domain::recording::AudioEncoder;

/// Interleaved integer PCM layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Signed 16-bit PCM with the given rate and channel count
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Bytes in one frame (one sample per channel)
    pub const fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Playback time covered by `bytes` of data
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame = self.block_align();
        if frame == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (bytes / frame) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / u64::from(self.sample_rate))
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// One buffer delivered by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSample {
    /// Device clock position of the first frame
    pub timestamp: Duration,
    pub duration: Duration,
    /// Host-endian interleaved PCM in the negotiated format
    pub data: Vec<u8>,
}

/// Completion of one read request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Sample(CapturedSample),
    /// No data yet and no error
    Idle,
    Failed(String),
}

/// Presentation descriptor of an opened source, kept for restarting it
/// after a pause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub device_name: String,
    pub native_format: PcmFormat,
}

/// Input device as reported by a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Identifier accepted by `CapturePlatform::open_source`
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub default_format: Option<PcmFormat>,
}

/// Audio framework entry point
pub trait CapturePlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Live check: whether an encoder implementation for `encoder` can be
    /// instantiated right now
    fn has_encoder(&self, encoder: AudioEncoder) -> bool;

    /// Open the device with the given id, or the default input for `None`
    fn open_source(&self, device_id: Option<&str>)
        -> Result<Box<dyn CaptureSource>, RecorderError>;

    fn input_devices(&self) -> Result<Vec<DeviceInfo>, RecorderError>;
}

/// An opened capture device
pub trait CaptureSource: Send {
    fn create_descriptor(&self) -> Result<SourceDescriptor, RecorderError>;

    /// Negotiate a PCM stream close to `requested`.
    ///
    /// # Returns
    /// The format the device will actually deliver and the stream to read from
    fn open_stream(
        &mut self,
        requested: PcmFormat,
    ) -> Result<(PcmFormat, Box<dyn SampleStream>), RecorderError>;

    /// Start or restart delivery. `position` seeds the device clock so the
    /// next sample continues from it.
    fn start(
        &mut self,
        descriptor: &SourceDescriptor,
        position: Option<Duration>,
    ) -> Result<(), RecorderError>;

    fn pause(&mut self) -> Result<(), RecorderError>;

    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Release the device. Streams return `None` afterwards.
    fn shutdown(&mut self);
}

/// Blocking sample source consumed by the reader thread
pub trait SampleStream: Send {
    /// Wait a short while for the next buffer.
    ///
    /// # Returns
    /// `None` once the source has been shut down
    fn next_sample(&mut self) -> Option<ReadOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_align_and_duration() {
        let format = PcmFormat::pcm16(48_000, 2);
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.duration_of(192_000), Duration::from_secs(1));
        assert_eq!(format.duration_of(3), Duration::ZERO);
    }

    #[test]
    fn display_format() {
        assert_eq!(PcmFormat::pcm16(16_000, 1).to_string(), "16000 Hz, 1 ch, 16-bit");
    }
}
