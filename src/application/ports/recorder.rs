//! Recorder port interface

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::capture::PcmFormat;
use crate::domain::error::InvalidRecordConfig;
use crate::domain::recording::{Amplitude, AudioEncoder, RecordConfig};

/// Recorder errors
#[derive(Debug, Clone, Error)]
pub enum RecorderError {
    /// The encoder or mode is not available on the active backend
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid recording config: {0}")]
    InvalidConfig(String),

    /// Device, reader or writer could not be created
    #[error("Failed to acquire capture resources: {0}")]
    ResourceAcquisitionFailed(String),

    /// The helper process could not be launched or a directive was not delivered
    #[error("Helper process failed: {0}")]
    ExternalProcessFailed(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// The capture pipeline reported an error mid-session
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

impl From<InvalidRecordConfig> for RecorderError {
    fn from(err: InvalidRecordConfig) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Single control surface shared by every capture backend.
///
/// Control calls are async; state queries are pure, non-blocking reads.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Begin file-backed capture. A session already in progress is
    /// finalized first.
    async fn start(&self, config: RecordConfig, path: &Path) -> Result<(), RecorderError>;

    /// Begin live-delivery capture with no destination file (PCM16 only)
    async fn start_stream(&self, config: RecordConfig) -> Result<(), RecorderError>;

    /// Pause capture; no-op outside RECORD
    async fn pause(&self) -> Result<(), RecorderError>;

    /// Resume capture, continuing the output timeline; no-op outside PAUSE
    async fn resume(&self) -> Result<(), RecorderError>;

    /// Finalize the session.
    ///
    /// # Returns
    /// The finished file, or `None` when nothing was written (the partial
    /// file is deleted) or the session was streaming
    async fn stop(&self) -> Result<Option<PathBuf>, RecorderError>;

    /// Abort the session and delete its output file
    async fn cancel(&self) -> Result<(), RecorderError>;

    /// Release everything and stop emitting events. Safe to call repeatedly.
    async fn dispose(&self) -> Result<(), RecorderError>;

    fn is_recording(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Current and session-maximum level in dBFS
    fn amplitude(&self) -> Amplitude;

    /// Output path of the active session
    fn recording_path(&self) -> Option<PathBuf>;

    /// Recorded duration so far
    fn elapsed(&self) -> Duration;

    /// PCM layout the device negotiated for the active session.
    /// `None` when idle or when the backend does not expose it.
    fn input_format(&self) -> Option<PcmFormat> {
        None
    }

    /// Whether `start` would accept this encoder right now
    fn is_encoder_supported(&self, encoder: AudioEncoder) -> bool;

    /// Backend name for display
    fn name(&self) -> &'static str;
}
