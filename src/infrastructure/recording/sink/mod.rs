//! Output sink writers
//!
//! A sink receives rebased PCM samples for one session and produces the
//! output file in the container implied by the encoder.

mod flac;
#[cfg(feature = "opus")]
mod opus;
mod pcm;
mod wav;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use crate::application::ports::RecorderError;
use crate::domain::recording::{AudioEncoder, EncoderProfile};

pub use flac::{flac_encoder_available, FlacSink, FLAC_BLOCK_SIZE};
#[cfg(feature = "opus")]
pub use opus::{opus_available, OpusSink};
pub use pcm::RawPcmSink;
pub use wav::WavSink;

/// Sink errors
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Failed to create output file {path}: {message}")]
    Create { path: String, message: String },

    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Encoder failed: {0}")]
    Encode(String),

    #[error("No sink writer for encoder {0}")]
    Unsupported(AudioEncoder),
}

impl From<SinkError> for RecorderError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Create { .. } | SinkError::Unsupported(_) => {
                RecorderError::ResourceAcquisitionFailed(err.to_string())
            }
            SinkError::Write(_) | SinkError::Encode(_) => RecorderError::IoFailure(err.to_string()),
        }
    }
}

/// Result of finalizing a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub path: PathBuf,
    /// PCM bytes accepted over the session
    pub data_len: u64,
}

/// Per-session output writer
pub trait SinkWriter: Send {
    /// Append one sample at its rebased position
    fn write_sample(&mut self, timestamp: Duration, data: &[u8]) -> Result<(), SinkError>;

    /// Flush and close the output
    fn finalize(self: Box<Self>) -> Result<SinkSummary, SinkError>;
}

/// Create the writer for `profile.encoder` at `path`.
///
/// The profile must already describe the format the device delivers.
pub fn create_sink(
    path: &Path,
    profile: &EncoderProfile,
) -> Result<Box<dyn SinkWriter>, SinkError> {
    match profile.encoder {
        AudioEncoder::Pcm16Bits => Ok(Box::new(RawPcmSink::create(path, profile)?)),
        AudioEncoder::Wav => Ok(Box::new(WavSink::create(path, profile)?)),
        AudioEncoder::Flac => Ok(Box::new(FlacSink::create(path, profile)?)),
        #[cfg(feature = "opus")]
        AudioEncoder::Opus => Ok(Box::new(OpusSink::create(path, profile)?)),
        other => Err(SinkError::Unsupported(other)),
    }
}

/// Host-endian 16-bit PCM as little-endian bytes
pub(crate) fn pcm16_le(data: &[u8]) -> Cow<'_, [u8]> {
    if cfg!(target_endian = "little") {
        return Cow::Borrowed(data);
    }
    Cow::Owned(
        data.chunks_exact(2)
            .flat_map(|pair| i16::from_ne_bytes([pair[0], pair[1]]).to_le_bytes())
            .collect(),
    )
}

/// Host-endian 16-bit PCM as samples
pub(crate) fn pcm16_samples(data: &[u8]) -> impl Iterator<Item = i16> + '_ {
    data.chunks_exact(2)
        .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
}

/// Tracks the written position of a PCM sink to spot timeline holes
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timeline {
    bytes_per_second: u64,
    written: u64,
}

impl Timeline {
    pub(crate) fn new(profile: &EncoderProfile) -> Self {
        let block_align = u64::from(profile.num_channels) * u64::from(profile.bits_per_sample / 8);
        Self {
            bytes_per_second: block_align * u64::from(profile.sample_rate),
            written: 0,
        }
    }

    pub(crate) fn advance(&mut self, timestamp: Duration, len: usize) {
        if self.bytes_per_second > 0 {
            let position =
                Duration::from_nanos(self.written * 1_000_000_000 / self.bytes_per_second);
            if timestamp > position + Duration::from_millis(1) {
                trace!(?timestamp, ?position, "sample starts past written position");
            }
        }
        self.written += len as u64;
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_encoders_have_no_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m4a");
        let profile = EncoderProfile::for_format(AudioEncoder::AacLc, 128_000, 44_100, 2);

        let err = create_sink(&path, &profile).err().unwrap();
        assert!(matches!(err, SinkError::Unsupported(AudioEncoder::AacLc)));
        assert!(!path.exists());
    }

    #[test]
    fn sink_errors_map_to_recorder_errors() {
        let err: RecorderError = SinkError::Write("disk full".into()).into();
        assert!(matches!(err, RecorderError::IoFailure(_)));

        let err: RecorderError = SinkError::Unsupported(AudioEncoder::AmrNb).into();
        assert!(matches!(err, RecorderError::ResourceAcquisitionFailed(_)));
    }

    #[test]
    fn setup_failures_are_resource_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hi-res.flac");
        let profile = EncoderProfile::for_format(AudioEncoder::Flac, 0, 192_000, 2);

        let err: RecorderError = create_sink(&path, &profile).err().unwrap().into();
        assert!(matches!(err, RecorderError::ResourceAcquisitionFailed(_)));

        let path = dir.path().join("missing").join("out.wav");
        let profile = EncoderProfile::for_format(AudioEncoder::Wav, 0, 16_000, 1);
        let err: RecorderError = create_sink(&path, &profile).err().unwrap().into();
        assert!(matches!(err, RecorderError::ResourceAcquisitionFailed(_)));
    }

    #[test]
    fn pcm16_le_round_trips_host_samples() {
        let data: Vec<u8> = [1i16, -2, 300].iter().flat_map(|s| s.to_ne_bytes()).collect();
        let le = pcm16_le(&data);
        let samples: Vec<i16> = le
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(samples, vec![1, -2, 300]);
        assert_eq!(pcm16_samples(&data).collect::<Vec<_>>(), vec![1, -2, 300]);
    }
}
