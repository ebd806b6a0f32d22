//! Push-driven capture platform
//!
//! Stands in for a microphone: callers push PCM chunks through a
//! `ScriptedDevice` handle and the engine receives them exactly as it would
//! from hardware. The device clock runs whether or not the source is
//! started, so time spent paused is visible to the engine.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::application::ports::{
    CapturePlatform, CaptureSource, CapturedSample, DeviceInfo, PcmFormat, ReadOutcome,
    RecorderError, SampleStream, SourceDescriptor,
};
use crate::domain::recording::AudioEncoder;

/// Identifier of the single scripted input
pub const SCRIPTED_DEVICE_ID: &str = "scripted:0";

const DEVICE_NAME: &str = "Scripted Input";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Control call observed by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Open,
    Start(Option<Duration>),
    Pause,
    Stop,
    Shutdown,
}

#[derive(Debug)]
struct DeviceState {
    /// Fixed delivery format; `None` accepts whatever is requested
    fixed_format: Option<PcmFormat>,
    stream_format: PcmFormat,
    queue: VecDeque<ReadOutcome>,
    clock: Duration,
    running: bool,
    /// Incremented per opened source; older streams see themselves closed
    epoch: u64,
    shut_down: bool,
    /// A reader is blocked waiting for data
    waiting: bool,
    honor_position: bool,
    fail_next_open: Option<String>,
    calls: Vec<DeviceCall>,
}

#[derive(Debug)]
struct DeviceShared {
    state: Mutex<DeviceState>,
    changed: Condvar,
}

/// Handle used to feed the scripted device
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    shared: Arc<DeviceShared>,
}

impl ScriptedDevice {
    fn new() -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                state: Mutex::new(DeviceState {
                    fixed_format: None,
                    stream_format: PcmFormat::pcm16(44_100, 2),
                    queue: VecDeque::new(),
                    clock: Duration::ZERO,
                    running: false,
                    epoch: 0,
                    shut_down: true,
                    waiting: false,
                    honor_position: false,
                    fail_next_open: None,
                    calls: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver interleaved samples at the current clock position.
    ///
    /// # Returns
    /// Whether the chunk was queued (the source must be started)
    pub fn push_chunk(&self, samples: &[i16]) -> bool {
        let mut state = self.lock();
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let duration = state.stream_format.duration_of(data.len());
        let timestamp = state.clock;
        state.clock += duration;

        if !state.running || state.shut_down {
            return false;
        }
        state.queue.push_back(ReadOutcome::Sample(CapturedSample {
            timestamp,
            duration,
            data,
        }));
        self.shared.changed.notify_all();
        true
    }

    /// Let device time pass without delivering anything
    pub fn advance(&self, elapsed: Duration) {
        self.lock().clock += elapsed;
    }

    /// Report a device failure on the next read
    pub fn fail(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.queue.push_back(ReadOutcome::Failed(message.into()));
        self.shared.changed.notify_all();
    }

    /// Make the next `open_source` fail
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.lock().fail_next_open = Some(message.into());
    }

    /// Deliver in this format regardless of the request
    pub fn set_fixed_format(&self, format: PcmFormat) {
        self.lock().fixed_format = Some(format);
    }

    /// Whether `start(position)` moves the device clock to `position`
    pub fn set_honor_position(&self, honor: bool) {
        self.lock().honor_position = honor;
    }

    pub fn clock(&self) -> Duration {
        self.lock().clock
    }

    pub fn is_running(&self) -> bool {
        let state = self.lock();
        state.running && !state.shut_down
    }

    /// Control calls seen so far
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    /// Wait until every queued chunk has been consumed and a reader is
    /// waiting for more.
    ///
    /// # Returns
    /// `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.queue.is_empty() && state.waiting {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Capture platform backed by a `ScriptedDevice`
#[derive(Debug, Clone)]
pub struct ScriptedPlatform {
    device: ScriptedDevice,
    encoders: Vec<AudioEncoder>,
}

impl ScriptedPlatform {
    /// Platform with PCM, WAV and FLAC encoders
    pub fn new() -> Self {
        Self {
            device: ScriptedDevice::new(),
            encoders: vec![AudioEncoder::Pcm16Bits, AudioEncoder::Wav, AudioEncoder::Flac],
        }
    }

    /// Replace the set of encoders the platform reports
    pub fn with_encoders(mut self, encoders: &[AudioEncoder]) -> Self {
        self.encoders = encoders.to_vec();
        self
    }

    pub fn device(&self) -> ScriptedDevice {
        self.device.clone()
    }
}

impl Default for ScriptedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePlatform for ScriptedPlatform {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn has_encoder(&self, encoder: AudioEncoder) -> bool {
        self.encoders.contains(&encoder)
    }

    fn open_source(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureSource>, RecorderError> {
        if let Some(id) = device_id {
            if id != SCRIPTED_DEVICE_ID && id != DEVICE_NAME {
                return Err(RecorderError::ResourceAcquisitionFailed(format!(
                    "no input device named \"{}\"",
                    id
                )));
            }
        }

        let mut state = self.device.lock();
        if let Some(message) = state.fail_next_open.take() {
            return Err(RecorderError::ResourceAcquisitionFailed(message));
        }
        state.epoch += 1;
        state.shut_down = false;
        state.running = false;
        state.queue.clear();
        state.calls.push(DeviceCall::Open);
        let epoch = state.epoch;
        drop(state);

        Ok(Box::new(ScriptedSource {
            device: self.device.clone(),
            epoch,
        }))
    }

    fn input_devices(&self) -> Result<Vec<DeviceInfo>, RecorderError> {
        let state = self.device.lock();
        Ok(vec![DeviceInfo {
            id: SCRIPTED_DEVICE_ID.to_string(),
            name: DEVICE_NAME.to_string(),
            is_default: true,
            default_format: Some(state.fixed_format.unwrap_or(state.stream_format)),
        }])
    }
}

struct ScriptedSource {
    device: ScriptedDevice,
    epoch: u64,
}

impl ScriptedSource {
    fn with_state<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> Result<T, RecorderError> {
        let mut state = self.device.lock();
        if state.epoch != self.epoch || state.shut_down {
            return Err(RecorderError::CaptureFailed("source is shut down".into()));
        }
        let value = f(&mut state);
        self.device.shared.changed.notify_all();
        Ok(value)
    }
}

impl CaptureSource for ScriptedSource {
    fn create_descriptor(&self) -> Result<SourceDescriptor, RecorderError> {
        self.with_state(|state| SourceDescriptor {
            device_name: DEVICE_NAME.to_string(),
            native_format: state.fixed_format.unwrap_or(state.stream_format),
        })
    }

    fn open_stream(
        &mut self,
        requested: PcmFormat,
    ) -> Result<(PcmFormat, Box<dyn SampleStream>), RecorderError> {
        let format = self.with_state(|state| {
            state.stream_format = state.fixed_format.unwrap_or(requested);
            state.stream_format
        })?;
        Ok((
            format,
            Box::new(ScriptedStream {
                device: self.device.clone(),
                epoch: self.epoch,
            }),
        ))
    }

    fn start(
        &mut self,
        _descriptor: &SourceDescriptor,
        position: Option<Duration>,
    ) -> Result<(), RecorderError> {
        self.with_state(|state| {
            if let (true, Some(position)) = (state.honor_position, position) {
                state.clock = position;
            }
            state.running = true;
            state.calls.push(DeviceCall::Start(position));
        })
    }

    fn pause(&mut self) -> Result<(), RecorderError> {
        self.with_state(|state| {
            state.running = false;
            state.calls.push(DeviceCall::Pause);
        })
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.with_state(|state| {
            state.running = false;
            state.calls.push(DeviceCall::Stop);
        })
    }

    fn shutdown(&mut self) {
        let mut state = self.device.lock();
        if state.epoch == self.epoch && !state.shut_down {
            state.shut_down = true;
            state.running = false;
            state.queue.clear();
            state.calls.push(DeviceCall::Shutdown);
        }
        self.device.shared.changed.notify_all();
    }
}

struct ScriptedStream {
    device: ScriptedDevice,
    epoch: u64,
}

impl SampleStream for ScriptedStream {
    fn next_sample(&mut self) -> Option<ReadOutcome> {
        let shared = Arc::clone(&self.device.shared);
        let mut state = self.device.lock();
        let deadline = Instant::now() + POLL_INTERVAL;

        loop {
            if state.epoch != self.epoch || state.shut_down {
                state.waiting = false;
                return None;
            }
            if let Some(outcome) = state.queue.pop_front() {
                state.waiting = false;
                return Some(outcome);
            }

            let now = Instant::now();
            if now >= deadline {
                state.waiting = false;
                return Some(ReadOutcome::Idle);
            }

            if !state.waiting {
                state.waiting = true;
                shared.changed.notify_all();
            }
            state = shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
