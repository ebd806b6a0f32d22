//! Capture platform on top of cpal
//!
//! `cpal::Stream` is not `Send`, so each opened stream lives on its own
//! device thread and is driven through a command channel. The stream
//! callback converts input to signed 16-bit and hands buffers to the reader
//! through a bounded channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use tracing::{debug, info, warn};

use crate::application::ports::{
    CapturePlatform, CaptureSource, CapturedSample, DeviceInfo, PcmFormat, ReadOutcome,
    RecorderError, SampleStream, SourceDescriptor,
};
use crate::domain::recording::{AudioEncoder, FLAC_COMPRESSION_LEVEL};
use crate::infrastructure::recording::sink;

/// Buffers the device may queue ahead of the reader
const DEVICE_BUFFER_DEPTH: usize = 64;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// cpal default host
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalPlatform;

impl CpalPlatform {
    pub fn new() -> Self {
        Self
    }

    fn find_device(device_id: Option<&str>) -> Result<cpal::Device, RecorderError> {
        let host = cpal::default_host();
        match device_id {
            None => host.default_input_device().ok_or_else(|| {
                RecorderError::ResourceAcquisitionFailed("No audio input device available".into())
            }),
            Some(id) => host
                .input_devices()
                .map_err(|e| RecorderError::ResourceAcquisitionFailed(e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| {
                    RecorderError::ResourceAcquisitionFailed(format!(
                        "no input device named \"{}\"",
                        id
                    ))
                }),
        }
    }
}

impl CapturePlatform for CpalPlatform {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn has_encoder(&self, encoder: AudioEncoder) -> bool {
        match encoder {
            AudioEncoder::Pcm16Bits | AudioEncoder::Wav => true,
            AudioEncoder::Flac => sink::flac_encoder_available(FLAC_COMPRESSION_LEVEL),
            #[cfg(feature = "opus")]
            AudioEncoder::Opus => sink::opus_available(),
            _ => false,
        }
    }

    fn open_source(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureSource>, RecorderError> {
        let device = Self::find_device(device_id)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let default = device
            .default_input_config()
            .map_err(|e| RecorderError::ResourceAcquisitionFailed(e.to_string()))?;
        debug!(device = %name, "opened input device");

        Ok(Box::new(CpalSource {
            device_name: name,
            native_format: PcmFormat::pcm16(default.sample_rate().0, default.channels()),
            device: Some(DeviceThreadHandle::Idle(device)),
        }))
    }

    fn input_devices(&self) -> Result<Vec<DeviceInfo>, RecorderError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| RecorderError::ResourceAcquisitionFailed(e.to_string()))?;

        Ok(devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let default_format = device
                    .default_input_config()
                    .ok()
                    .map(|c| PcmFormat::pcm16(c.sample_rate().0, c.channels()));
                Some(DeviceInfo {
                    id: name.clone(),
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    default_format,
                })
            })
            .collect())
    }
}

enum DeviceCommand {
    Play,
    Pause,
    Shutdown,
}

/// Before `open_stream` the source holds the device itself; afterwards the
/// device belongs to its thread.
enum DeviceThreadHandle {
    Idle(cpal::Device),
    Running {
        commands: Sender<DeviceCommand>,
        thread: JoinHandle<()>,
        clock: Arc<StreamClock>,
    },
}

/// Frame-counted device position
#[derive(Debug)]
struct StreamClock {
    nanos: AtomicU64,
    sample_rate: u32,
    channels: u16,
    delivering: AtomicBool,
}

impl StreamClock {
    /// Claim the time range covered by `samples` interleaved values
    fn advance(&self, samples: usize) -> (Duration, Duration) {
        let frames = (samples / usize::from(self.channels.max(1))) as u64;
        let span = frames * 1_000_000_000 / u64::from(self.sample_rate.max(1));
        let start = self.nanos.fetch_add(span, Ordering::SeqCst);
        (Duration::from_nanos(start), Duration::from_nanos(span))
    }
}

struct CpalSource {
    device_name: String,
    native_format: PcmFormat,
    device: Option<DeviceThreadHandle>,
}

impl CpalSource {
    fn send(&self, command: DeviceCommand) -> Result<(), RecorderError> {
        match &self.device {
            Some(DeviceThreadHandle::Running { commands, .. }) => commands
                .send(command)
                .map_err(|_| RecorderError::CaptureFailed("device thread has exited".into())),
            _ => Err(RecorderError::CaptureFailed("stream is not open".into())),
        }
    }
}

/// Pick an I16/F32 input config as close to `requested` as the device allows
fn negotiate(
    device: &cpal::Device,
    requested: PcmFormat,
) -> Result<(StreamConfig, SampleFormat), RecorderError> {
    let configs = device
        .supported_input_configs()
        .map_err(|e| {
            RecorderError::ResourceAcquisitionFailed(format!("Failed to get configs: {}", e))
        })?;

    let includes_rate = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate().0 <= requested.sample_rate
            && c.max_sample_rate().0 >= requested.sample_rate
    };

    let mut best: Option<SupportedStreamConfigRange> = None;
    for config in configs {
        if !matches!(config.sample_format(), SampleFormat::I16 | SampleFormat::F32) {
            continue;
        }
        let score = |c: &SupportedStreamConfigRange| {
            (c.channels() == requested.channels) as u8 * 2 + includes_rate(c) as u8
        };
        let is_better = match &best {
            None => true,
            Some(current) => score(&config) > score(current),
        };
        if is_better {
            best = Some(config);
        }
    }

    let range = best.ok_or_else(|| {
        RecorderError::ResourceAcquisitionFailed("No suitable input config found".into())
    })?;

    let sample_rate = if includes_rate(&range) {
        SampleRate(requested.sample_rate)
    } else {
        range.max_sample_rate().min(SampleRate(48_000)).max(range.min_sample_rate())
    };

    Ok((
        StreamConfig {
            channels: range.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        },
        range.sample_format(),
    ))
}

/// Queue one converted buffer for the reader
fn deliver(tx: &SyncSender<ReadOutcome>, clock: &StreamClock, samples: &[i16]) {
    if !clock.delivering.load(Ordering::SeqCst) {
        return;
    }
    let (timestamp, duration) = clock.advance(samples.len());
    let data = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
    match tx.try_send(ReadOutcome::Sample(CapturedSample {
        timestamp,
        duration,
        data,
    })) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => warn!("reader fell behind, dropped an input buffer"),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    tx: SyncSender<ReadOutcome>,
    clock: Arc<StreamClock>,
) -> Result<cpal::Stream, RecorderError> {
    let err_tx = tx.clone();
    let on_error = move |err: cpal::StreamError| {
        let _ = err_tx.try_send(ReadOutcome::Failed(err.to_string()));
    };

    let stream = match format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| deliver(&tx, &clock, data),
            on_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                    .collect();
                deliver(&tx, &clock, &converted);
            },
            on_error,
            None,
        ),
        _ => {
            return Err(RecorderError::ResourceAcquisitionFailed(
                "Unsupported sample format".into(),
            ))
        }
    };
    stream.map_err(|e| RecorderError::ResourceAcquisitionFailed(e.to_string()))
}

impl CaptureSource for CpalSource {
    fn create_descriptor(&self) -> Result<SourceDescriptor, RecorderError> {
        Ok(SourceDescriptor {
            device_name: self.device_name.clone(),
            native_format: self.native_format,
        })
    }

    fn open_stream(
        &mut self,
        requested: PcmFormat,
    ) -> Result<(PcmFormat, Box<dyn SampleStream>), RecorderError> {
        let device = match self.device.take() {
            Some(DeviceThreadHandle::Idle(device)) => device,
            other => {
                self.device = other;
                return Err(RecorderError::ResourceAcquisitionFailed(
                    "stream already open".into(),
                ));
            }
        };

        let (config, sample_format) = negotiate(&device, requested)?;
        let negotiated = PcmFormat::pcm16(config.sample_rate.0, config.channels);
        let clock = Arc::new(StreamClock {
            nanos: AtomicU64::new(0),
            sample_rate: negotiated.sample_rate,
            channels: negotiated.channels,
            delivering: AtomicBool::new(false),
        });

        let (data_tx, data_rx) = mpsc::sync_channel(DEVICE_BUFFER_DEPTH);
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_clock = Arc::clone(&clock);

        let thread = thread::Builder::new()
            .name("cpal-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(
                    &device,
                    &config,
                    sample_format,
                    data_tx,
                    Arc::clone(&thread_clock),
                ) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_device(stream, &thread_clock, command_rx);
            })
            .map_err(|e| {
                RecorderError::ResourceAcquisitionFailed(format!("device thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(RecorderError::ResourceAcquisitionFailed(
                    "device thread exited during setup".into(),
                ))
            }
        }

        info!(
            device = %self.device_name,
            format = %negotiated,
            ?sample_format,
            "input stream ready"
        );
        self.device = Some(DeviceThreadHandle::Running {
            commands: command_tx,
            thread,
            clock,
        });
        Ok((negotiated, Box::new(CpalSampleStream { rx: data_rx })))
    }

    fn start(
        &mut self,
        _descriptor: &SourceDescriptor,
        position: Option<Duration>,
    ) -> Result<(), RecorderError> {
        if let (Some(DeviceThreadHandle::Running { clock, .. }), Some(position)) =
            (&self.device, position)
        {
            clock
                .nanos
                .store(position.as_nanos() as u64, Ordering::SeqCst);
        }
        self.send(DeviceCommand::Play)
    }

    fn pause(&mut self) -> Result<(), RecorderError> {
        self.send(DeviceCommand::Pause)
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.send(DeviceCommand::Pause)
    }

    fn shutdown(&mut self) {
        if let Some(DeviceThreadHandle::Running {
            commands, thread, ..
        }) = self.device.take()
        {
            let _ = commands.send(DeviceCommand::Shutdown);
            if thread.join().is_err() {
                warn!("device thread panicked");
            }
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Device thread body: owns the stream until shutdown
fn run_device(stream: cpal::Stream, clock: &StreamClock, commands: Receiver<DeviceCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Play => {
                clock.delivering.store(true, Ordering::SeqCst);
                if let Err(e) = stream.play() {
                    warn!(error = %e, "failed to start input stream");
                }
            }
            DeviceCommand::Pause => {
                clock.delivering.store(false, Ordering::SeqCst);
                if let Err(e) = stream.pause() {
                    debug!(error = %e, "input stream cannot pause, dropping buffers instead");
                }
            }
            DeviceCommand::Shutdown => break,
        }
    }
    clock.delivering.store(false, Ordering::SeqCst);
    drop(stream);
}

struct CpalSampleStream {
    rx: Receiver<ReadOutcome>,
}

impl SampleStream for CpalSampleStream {
    fn next_sample(&mut self) -> Option<ReadOutcome> {
        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => Some(ReadOutcome::Idle),
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
