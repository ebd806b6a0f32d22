//! Native capture engine
//!
//! Drives a capture source, an asynchronous sample reader and an optional
//! sink writer. Capture continues only because each completion re-arms the
//! reader; control calls and completions serialize on one lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::reader::{AsyncSampleReader, ReadCallback};
use crate::application::events::EventSink;
use crate::application::ports::{
    CapturePlatform, CaptureSource, CapturedSample, DeviceInfo, PcmFormat, ReadOutcome, Recorder,
    RecorderError, SourceDescriptor,
};
use crate::domain::recording::{
    Amplitude, AudioEncoder, EncoderProfile, RecordConfig, RecordState, RecordingSession,
    SampleWidth,
};
use crate::infrastructure::recording::sink::{create_sink, SinkSummary, SinkWriter};

/// How `end_recording` treats the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Keep,
    Delete,
}

#[derive(Default)]
struct EngineState {
    session: RecordingSession,
    /// Bumped on every start; completions carrying an older value are stale
    generation: u64,
    source: Option<Box<dyn CaptureSource>>,
    descriptor: Option<SourceDescriptor>,
    reader: Option<AsyncSampleReader>,
    writer: Option<Box<dyn SinkWriter>>,
    profile: Option<EncoderProfile>,
    input_format: Option<PcmFormat>,
    pipeline_error: Option<String>,
}

struct Shared {
    platform: Arc<dyn CapturePlatform>,
    events: EventSink,
    inner: Mutex<EngineState>,
}

/// Handles acquired by a successful start
struct Pipeline {
    source: Box<dyn CaptureSource>,
    descriptor: SourceDescriptor,
    reader: AsyncSampleReader,
    writer: Option<Box<dyn SinkWriter>>,
    profile: EncoderProfile,
    input_format: PcmFormat,
}

/// Backend built on an in-process capture framework
pub struct NativeCaptureEngine {
    shared: Arc<Shared>,
}

impl NativeCaptureEngine {
    pub fn new(platform: Arc<dyn CapturePlatform>, events: EventSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                platform,
                events,
                inner: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Input devices of the underlying platform
    pub fn input_devices(&self) -> Result<Vec<DeviceInfo>, RecorderError> {
        self.shared.platform.input_devices()
    }

    /// Last pipeline failure of the active session, if any
    pub fn pipeline_error(&self) -> Option<String> {
        self.shared.lock().pipeline_error.clone()
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, RecorderError>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Shared>) -> Result<T, RecorderError> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || op(&shared))
            .await
            .map_err(|e| RecorderError::CaptureFailed(format!("Task join error: {}", e)))?
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        self: &Arc<Self>,
        config: RecordConfig,
        path: Option<PathBuf>,
    ) -> Result<(), RecorderError> {
        config.validate()?;
        let encoder = config.encoder;

        if path.is_none() && encoder != AudioEncoder::Pcm16Bits {
            return Err(RecorderError::Unsupported(format!(
                "live delivery needs {}, got {}",
                AudioEncoder::Pcm16Bits,
                encoder
            )));
        }
        if !self.platform.has_encoder(encoder) {
            return Err(RecorderError::Unsupported(format!(
                "{} has no {} encoder",
                self.platform.name(),
                encoder
            )));
        }

        let mut state = self.lock();
        if state.session.is_active() {
            info!("finishing previous session before restart");
            if let Err(e) = self.end_recording(&mut state, Disposition::Keep) {
                warn!(error = %e, "previous session did not finalize cleanly");
            }
        }

        state.generation += 1;
        let generation = state.generation;

        let pipeline = match self.acquire(&config, path.as_deref(), generation) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(error = %e, "failed to start capture");
                return Err(e);
            }
        };

        let input_format = pipeline.input_format;
        state.source = Some(pipeline.source);
        state.descriptor = Some(pipeline.descriptor);
        state.writer = pipeline.writer;
        state.profile = Some(pipeline.profile);
        state.input_format = Some(input_format);
        state.reader = Some(pipeline.reader);
        state.pipeline_error = None;

        if let Err(e) = self.start_capture(&mut state) {
            error!(error = %e, "failed to start capture");
            self.release_failed_start(&mut state, path.as_deref());
            return Err(e);
        }

        state
            .session
            .begin(config, path)
            .map_err(|e| RecorderError::CaptureFailed(e.to_string()))?;
        info!(encoder = %encoder, format = %input_format, "capture started");
        self.events.emit_state(RecordState::Record);
        Ok(())
    }

    /// Open the device, negotiate the format, and create reader and writer
    fn acquire(
        self: &Arc<Self>,
        config: &RecordConfig,
        path: Option<&Path>,
        generation: u64,
    ) -> Result<Pipeline, RecorderError> {
        let mut source = self.platform.open_source(config.device_id.as_deref())?;
        let descriptor = match source.create_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                source.shutdown();
                return Err(e);
            }
        };

        let requested = PcmFormat::pcm16(config.sample_rate, config.num_channels);
        let (input_format, stream) = match source.open_stream(requested) {
            Ok(opened) => opened,
            Err(e) => {
                source.shutdown();
                return Err(e);
            }
        };
        if input_format != requested {
            debug!(requested = %requested, negotiated = %input_format, "device format differs");
        }

        let callback: Weak<dyn ReadCallback> = Arc::downgrade(self) as Weak<dyn ReadCallback>;
        let reader = match AsyncSampleReader::spawn(stream, callback, generation) {
            Ok(reader) => reader,
            Err(e) => {
                source.shutdown();
                return Err(e);
            }
        };

        let profile = EncoderProfile::derive(config)
            .with_input_format(input_format.sample_rate, input_format.channels);

        let writer = match path {
            Some(path) => match create_sink(path, &profile) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    reader.cancel();
                    source.shutdown();
                    return Err(e.into());
                }
            },
            None => None,
        };

        Ok(Pipeline {
            source,
            descriptor,
            reader,
            writer,
            profile,
            input_format,
        })
    }

    /// Start the source and issue the first read
    fn start_capture(&self, state: &mut EngineState) -> Result<(), RecorderError> {
        let EngineState {
            source,
            descriptor,
            reader,
            ..
        } = state;
        let (Some(source), Some(descriptor), Some(reader)) =
            (source.as_mut(), descriptor.as_ref(), reader.as_ref())
        else {
            return Err(RecorderError::CaptureFailed("pipeline incomplete".into()));
        };

        source.start(descriptor, None)?;
        reader.request_sample()?;
        Ok(())
    }

    fn release_failed_start(&self, state: &mut EngineState, path: Option<&Path>) {
        let had_writer = state.writer.is_some();
        self.release_handles(state);
        if let (true, Some(path)) = (had_writer, path) {
            remove_output(path);
        }
    }

    /// Release reader, source and writer in that order
    fn release_handles(&self, state: &mut EngineState) -> Option<SinkSummary> {
        if let Some(reader) = state.reader.take() {
            reader.cancel();
        }

        if let Some(mut source) = state.source.take() {
            if let Err(e) = source.stop() {
                warn!(error = %e, "capture source did not stop cleanly");
            }
            source.shutdown();
        }

        let summary = match state.writer.take().map(|writer| writer.finalize()) {
            Some(Ok(summary)) => Some(summary),
            Some(Err(e)) => {
                error!(error = %e, "failed to finalize output");
                state.pipeline_error.get_or_insert_with(|| e.to_string());
                None
            }
            None => None,
        };

        state.descriptor = None;
        state.profile = None;
        state.input_format = None;
        summary
    }

    /// Tear down the active session. Idempotent.
    ///
    /// # Returns
    /// The finished file when it is kept
    fn end_recording(
        &self,
        state: &mut EngineState,
        disposition: Disposition,
    ) -> Result<Option<PathBuf>, RecorderError> {
        let path = state.session.output_path().map(Path::to_path_buf);
        let had_writer = state.writer.is_some();

        let summary = self.release_handles(state);
        let finalize_error = state
            .pipeline_error
            .take()
            .filter(|_| had_writer && summary.is_none());

        let mut result = Ok(None);
        if disposition == Disposition::Keep {
            if let Some(message) = finalize_error {
                result = Err(RecorderError::IoFailure(message));
            } else if let Some(summary) = summary {
                result = Ok(Some(summary.path));
            }
        }

        let previous = state.session.finish();

        if disposition == Disposition::Delete {
            if let Some(path) = &path {
                remove_output(path);
            }
        }

        if previous != RecordState::Stop {
            self.events.emit_state(RecordState::Stop);
        }
        result
    }

    fn pause(&self) -> Result<(), RecorderError> {
        let mut state = self.lock();
        if !state.session.is_recording() {
            return Ok(());
        }
        if let Some(source) = state.source.as_mut() {
            source.pause()?;
        }
        state.session.pause();
        debug!(elapsed = ?state.session.elapsed(), "capture paused");
        self.events.emit_state(RecordState::Pause);
        Ok(())
    }

    fn resume(&self) -> Result<(), RecorderError> {
        let mut state = self.lock();
        if !state.session.is_paused() {
            return Ok(());
        }

        let position = state.session.resume_position();
        {
            let EngineState {
                source, descriptor, ..
            } = &mut *state;
            if let (Some(source), Some(descriptor)) = (source.as_mut(), descriptor.as_ref()) {
                source.start(descriptor, position)?;
            }
        }
        state.session.resume();

        if let Some(reader) = state.reader.as_ref() {
            if state.pipeline_error.is_none() && !reader.is_pending() {
                reader.request_sample()?;
            }
        }
        debug!(?position, "capture resumed");
        self.events.emit_state(RecordState::Record);
        Ok(())
    }

    fn stop(&self) -> Result<Option<PathBuf>, RecorderError> {
        let mut state = self.lock();
        if !state.session.is_active() {
            return Ok(None);
        }

        if state.session.bytes_written() == 0 {
            debug!("nothing written, discarding output");
            return self.end_recording(&mut state, Disposition::Delete).map(|_| None);
        }

        let written = state.session.bytes_written();
        let result = self.end_recording(&mut state, Disposition::Keep);
        if let Ok(Some(path)) = &result {
            info!(path = %path.display(), bytes = written, "recording finalized");
        }
        result
    }

    fn cancel(&self) -> Result<(), RecorderError> {
        let mut state = self.lock();
        self.end_recording(&mut state, Disposition::Delete).map(|_| ())
    }

    fn dispose(&self) -> Result<(), RecorderError> {
        let result = {
            let mut state = self.lock();
            self.end_recording(&mut state, Disposition::Keep).map(|_| ())
        };
        self.events.close();
        result
    }

    /// Handle one delivered sample. Errors stop the read loop.
    fn process_sample(
        &self,
        state: &mut EngineState,
        sample: CapturedSample,
    ) -> Result<(), String> {
        if state.session.is_paused() {
            return Ok(());
        }

        let CapturedSample {
            timestamp,
            duration,
            data,
        } = sample;
        let rebased = state.session.on_sample(timestamp, duration);

        if let Some(writer) = state.writer.as_mut() {
            writer
                .write_sample(rebased, &data)
                .map_err(|e| e.to_string())?;
            state.session.add_written(data.len());
        }

        state.session.update_amplitude(&data, SampleWidth::Pcm16);

        if state.writer.is_none() {
            self.events.emit_data(data);
        }
        Ok(())
    }
}

impl ReadCallback for Shared {
    fn on_read_complete(&self, token: u64, outcome: ReadOutcome) {
        let mut state = self.lock();
        if state.generation != token || state.reader.is_none() {
            return;
        }

        let processed = match outcome {
            ReadOutcome::Sample(sample) => self.process_sample(&mut state, sample),
            ReadOutcome::Idle => Ok(()),
            ReadOutcome::Failed(message) => Err(message),
        };

        if let Err(message) = processed {
            error!(error = %message, "capture pipeline failed, read loop stopped");
            state.pipeline_error = Some(message);
            return;
        }

        if let Some(reader) = state.reader.as_ref() {
            if let Err(e) = reader.request_sample() {
                warn!(error = %e, "could not re-arm sample reader");
                state.pipeline_error = Some(e.to_string());
            }
        }
    }
}

/// Best-effort delete of an output file
fn remove_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "output removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove output"),
    }
}

#[async_trait]
impl Recorder for NativeCaptureEngine {
    async fn start(&self, config: RecordConfig, path: &Path) -> Result<(), RecorderError> {
        let path = path.to_path_buf();
        self.run_blocking(move |shared| shared.begin(config, Some(path)))
            .await
    }

    async fn start_stream(&self, config: RecordConfig) -> Result<(), RecorderError> {
        self.run_blocking(move |shared| shared.begin(config, None)).await
    }

    async fn pause(&self) -> Result<(), RecorderError> {
        self.run_blocking(|shared| shared.pause()).await
    }

    async fn resume(&self) -> Result<(), RecorderError> {
        self.run_blocking(|shared| shared.resume()).await
    }

    async fn stop(&self) -> Result<Option<PathBuf>, RecorderError> {
        self.run_blocking(|shared| shared.stop()).await
    }

    async fn cancel(&self) -> Result<(), RecorderError> {
        self.run_blocking(|shared| shared.cancel()).await
    }

    async fn dispose(&self) -> Result<(), RecorderError> {
        self.run_blocking(|shared| shared.dispose()).await
    }

    fn is_recording(&self) -> bool {
        self.shared.lock().session.is_recording()
    }

    fn is_paused(&self) -> bool {
        self.shared.lock().session.is_paused()
    }

    fn amplitude(&self) -> Amplitude {
        self.shared.lock().session.amplitude()
    }

    fn recording_path(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .session
            .output_path()
            .map(Path::to_path_buf)
    }

    fn elapsed(&self) -> Duration {
        self.shared.lock().session.elapsed()
    }

    fn input_format(&self) -> Option<PcmFormat> {
        self.shared.lock().input_format
    }

    fn is_encoder_supported(&self, encoder: AudioEncoder) -> bool {
        self.shared.platform.has_encoder(encoder)
    }

    fn name(&self) -> &'static str {
        self.shared.platform.name()
    }
}

impl Drop for NativeCaptureEngine {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.session.is_active() || state.reader.is_some() {
            let _ = self.shared.end_recording(&mut state, Disposition::Keep);
        }
    }
}
