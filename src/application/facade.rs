//! Recorder facade
//!
//! Binds one backend at construction and exposes it through the common
//! `Recorder` surface. The backend never changes for the lifetime of the
//! facade.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::events::{event_channel, EventSink, EventStream};
use super::ports::{PcmFormat, Recorder, RecorderError};
use crate::domain::recording::{Amplitude, AudioEncoder, BackendKind, RecordConfig};

/// Single control surface over the selected backend
pub struct RecorderFacade {
    kind: BackendKind,
    backend: Box<dyn Recorder>,
    events: EventSink,
}

impl RecorderFacade {
    /// Build the facade around a backend.
    ///
    /// `build` receives the sink the backend must publish its events to; the
    /// matching stream is returned to the caller.
    pub fn new<F>(kind: BackendKind, build: F) -> (Self, EventStream)
    where
        F: FnOnce(EventSink) -> Box<dyn Recorder>,
    {
        let (events, stream) = event_channel();
        let backend = build(events.clone());
        debug!(backend = backend.name(), kind = %kind, "recorder facade created");
        (
            Self {
                kind,
                backend,
                events,
            },
            stream,
        )
    }

    /// Backend tier chosen at construction
    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

#[async_trait]
impl Recorder for RecorderFacade {
    async fn start(&self, config: RecordConfig, path: &Path) -> Result<(), RecorderError> {
        self.backend.start(config, path).await
    }

    async fn start_stream(&self, config: RecordConfig) -> Result<(), RecorderError> {
        self.backend.start_stream(config).await
    }

    async fn pause(&self) -> Result<(), RecorderError> {
        self.backend.pause().await
    }

    async fn resume(&self) -> Result<(), RecorderError> {
        self.backend.resume().await
    }

    async fn stop(&self) -> Result<Option<PathBuf>, RecorderError> {
        self.backend.stop().await
    }

    async fn cancel(&self) -> Result<(), RecorderError> {
        self.backend.cancel().await
    }

    async fn dispose(&self) -> Result<(), RecorderError> {
        let result = self.backend.dispose().await;
        self.events.close();
        result
    }

    fn is_recording(&self) -> bool {
        self.backend.is_recording()
    }

    fn is_paused(&self) -> bool {
        self.backend.is_paused()
    }

    fn amplitude(&self) -> Amplitude {
        self.backend.amplitude()
    }

    fn recording_path(&self) -> Option<PathBuf> {
        self.backend.recording_path()
    }

    fn elapsed(&self) -> Duration {
        self.backend.elapsed()
    }

    fn input_format(&self) -> Option<PcmFormat> {
        self.backend.input_format()
    }

    fn is_encoder_supported(&self, encoder: AudioEncoder) -> bool {
        self.backend.is_encoder_supported(encoder)
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }
}
