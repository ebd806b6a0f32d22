//! Command runners

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::events::{EventStream, RecorderEvent};
use crate::application::ports::{
    CapturePlatform, ConfigStore, PcmFormat, Recorder, RecorderError,
};
use crate::domain::config::AppConfig;
use crate::domain::recording::{
    AudioEncoder, BackendKind, RecordConfig, RecordState, TimeLimit, ALL_ENCODERS,
};
use crate::infrastructure::recording::{create_recorder, BackendOptions, CpalPlatform};
use crate::infrastructure::XdgConfigStore;

use super::args::{FormatArgs, RecordArgs, RecordOptions, StreamOptions};
use super::presenter::Presenter;
use super::signals::{ControlSignal, ControlSignals};

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// Environment overrides
pub const ENV_DEVICE: &str = "RECORD_ENGINE_DEVICE";
pub const ENV_HELPER: &str = "RECORD_ENGINE_HELPER";

const METER_INTERVAL: Duration = Duration::from_millis(100);

/// How a capture loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Interrupted,
    TimeLimit,
    /// The recorder stopped or closed its event stream
    RecorderStopped,
}

/// Config values given on the command line
pub fn format_overrides(format: &FormatArgs) -> AppConfig {
    AppConfig {
        sample_rate: format.sample_rate,
        channels: format.channels,
        device: format.device.clone(),
        ..Default::default()
    }
}

pub fn record_overrides(args: &RecordArgs) -> AppConfig {
    AppConfig {
        encoder: args.encoder.clone(),
        bit_rate: args.bit_rate,
        backend: args
            .backend
            .map(|b| BackendKind::from(b).as_str().to_string()),
        ..format_overrides(&args.format)
    }
}

/// Config values taken from the environment
pub fn env_config() -> AppConfig {
    AppConfig {
        device: env::var(ENV_DEVICE).ok().filter(|s| !s.is_empty()),
        helper_path: env::var(ENV_HELPER).ok().filter(|s| !s.is_empty()),
        ..Default::default()
    }
}

/// Load and merge configuration: defaults < file < env < cli
pub async fn load_merged_config(cli_config: AppConfig) -> AppConfig {
    let store = XdgConfigStore::new();
    let file_config = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable config file");
            AppConfig::empty()
        }
    };

    AppConfig::defaults()
        .merge(file_config)
        .merge(env_config())
        .merge(cli_config)
}

fn parse_time_limit(duration: Option<&str>) -> Result<Option<TimeLimit>, String> {
    duration
        .map(|s| s.parse::<TimeLimit>().map_err(|e| e.to_string()))
        .transpose()
}

fn checked_record_config(
    config: &AppConfig,
    encoder: AudioEncoder,
) -> Result<RecordConfig, String> {
    let mut record_config = config.record_config();
    record_config.encoder = encoder;
    record_config.validate().map_err(|e| e.to_string())?;
    Ok(record_config)
}

/// Resolve `record` options. Errors are usage errors.
pub fn build_record_options(
    output: PathBuf,
    duration: Option<&str>,
    config: &AppConfig,
) -> Result<RecordOptions, String> {
    let encoder = match config.encoder.as_deref() {
        Some(name) => name.parse::<AudioEncoder>().map_err(|e| e.to_string())?,
        None => AudioEncoder::Wav,
    };
    let backend = match config.backend.as_deref() {
        Some(name) => name.parse::<BackendKind>().map_err(|e| e.to_string())?,
        None => BackendKind::default(),
    };

    Ok(RecordOptions {
        output,
        config: checked_record_config(config, encoder)?,
        time_limit: parse_time_limit(duration)?,
        backend,
        helper_path: config.helper_path(),
    })
}

/// Resolve `stream` options. Live delivery is always PCM16.
pub fn build_stream_options(
    duration: Option<&str>,
    config: &AppConfig,
) -> Result<StreamOptions, String> {
    Ok(StreamOptions {
        config: checked_record_config(config, AudioEncoder::Pcm16Bits)?,
        time_limit: parse_time_limit(duration)?,
    })
}

fn limit_reached(recorder: &dyn Recorder, time_limit: Option<TimeLimit>) -> bool {
    time_limit
        .map(|limit| recorder.elapsed() >= limit.as_std())
        .unwrap_or(false)
}

async fn toggle_pause(recorder: &dyn Recorder) -> Result<(), RecorderError> {
    if recorder.is_paused() {
        recorder.resume().await
    } else {
        recorder.pause().await
    }
}

/// Drive a file-backed session until interrupted or the limit is reached
pub async fn capture_until_done(
    recorder: &dyn Recorder,
    events: &mut EventStream,
    signals: &mut ControlSignals,
    time_limit: Option<TimeLimit>,
    presenter: &Presenter,
) -> Result<CaptureEnd, RecorderError> {
    let mut ticker = interval(METER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                presenter.update_meter(
                    recorder.amplitude(),
                    recorder.elapsed(),
                    recorder.is_paused(),
                );
                if limit_reached(recorder, time_limit) {
                    info!("time limit reached");
                    return Ok(CaptureEnd::TimeLimit);
                }
            }
            signal = signals.recv() => match signal {
                Some(ControlSignal::TogglePause) => toggle_pause(recorder).await?,
                Some(ControlSignal::Shutdown) | None => return Ok(CaptureEnd::Interrupted),
            },
            event = events.recv() => match event {
                Some(RecorderEvent::State(RecordState::Stop)) | None => {
                    return Ok(CaptureEnd::RecorderStopped)
                }
                Some(RecorderEvent::State(state)) => debug!(%state, "recorder state changed"),
                Some(RecorderEvent::Data(_)) => {}
            },
        }
    }
}

/// Copy live PCM to `out` until interrupted or the limit is reached
pub async fn stream_until_done<W>(
    recorder: &dyn Recorder,
    events: &mut EventStream,
    signals: &mut ControlSignals,
    time_limit: Option<TimeLimit>,
    out: &mut W,
) -> Result<CaptureEnd, RecorderError>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = interval(METER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if limit_reached(recorder, time_limit) {
                    return Ok(CaptureEnd::TimeLimit);
                }
            }
            signal = signals.recv() => match signal {
                Some(ControlSignal::TogglePause) => toggle_pause(recorder).await?,
                Some(ControlSignal::Shutdown) | None => return Ok(CaptureEnd::Interrupted),
            },
            event = events.recv() => match event {
                Some(RecorderEvent::Data(data)) => {
                    if let Err(e) = out.write_all(&data).await {
                        // Reader went away
                        debug!(error = %e, "output closed");
                        return Ok(CaptureEnd::Interrupted);
                    }
                }
                Some(RecorderEvent::State(RecordState::Stop)) | None => {
                    return Ok(CaptureEnd::RecorderStopped)
                }
                Some(RecorderEvent::State(_)) => {}
            },
        }
    }
}

fn describe_output(path: &Path, elapsed: Duration, presenter: &Presenter) -> String {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    format!(
        "Saved {} ({}, {} bytes)",
        path.display(),
        presenter.format_elapsed(elapsed),
        size
    )
}

/// Run `record`
pub async fn run_record(options: RecordOptions) -> ExitCode {
    let mut presenter = Presenter::new();

    let mut signals = match ControlSignals::listen() {
        Ok(signals) => signals,
        Err(e) => {
            presenter.error(&format!("Failed to setup signal handler: {}", e));
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut backend_options = BackendOptions::default();
    if let Some(path) = &options.helper_path {
        backend_options = backend_options.with_helper_path(path);
    }
    let (recorder, mut events) = create_recorder(options.backend, backend_options);

    if let Err(e) = recorder.start(options.config.clone(), &options.output).await {
        presenter.error(&e.to_string());
        return ExitCode::from(EXIT_ERROR);
    }

    presenter.start_meter("Recording...");
    let outcome = capture_until_done(
        &recorder,
        &mut events,
        &mut signals,
        options.time_limit,
        &presenter,
    )
    .await;
    let elapsed = recorder.elapsed();
    presenter.stop_meter();

    let stopped = recorder.stop().await;
    if let Err(e) = recorder.dispose().await {
        warn!(error = %e, "dispose failed");
    }

    if let Err(e) = outcome {
        presenter.error(&e.to_string());
        return ExitCode::from(EXIT_ERROR);
    }
    match stopped {
        Ok(Some(path)) => {
            presenter.success(&describe_output(&path, elapsed, &presenter));
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(None) => {
            presenter.warn("Nothing was recorded; no file written");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            presenter.error(&e.to_string());
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Status line naming the PCM layout written to stdout
fn stream_banner(format: PcmFormat) -> String {
    format!("Streaming {} PCM to stdout", format)
}

/// Run `stream`
pub async fn run_stream(options: StreamOptions) -> ExitCode {
    let presenter = Presenter::new();

    let mut signals = match ControlSignals::listen() {
        Ok(signals) => signals,
        Err(e) => {
            presenter.error(&format!("Failed to setup signal handler: {}", e));
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let (recorder, mut events) = create_recorder(BackendKind::Native, BackendOptions::default());
    if let Err(e) = recorder.start_stream(options.config.clone()).await {
        presenter.error(&e.to_string());
        return ExitCode::from(EXIT_ERROR);
    }
    let format = recorder.input_format().unwrap_or_else(|| {
        PcmFormat::pcm16(options.config.sample_rate, options.config.num_channels)
    });
    presenter.info(&stream_banner(format));

    let mut stdout = tokio::io::stdout();
    let outcome = stream_until_done(
        &recorder,
        &mut events,
        &mut signals,
        options.time_limit,
        &mut stdout,
    )
    .await;

    if let Err(e) = recorder.stop().await {
        warn!(error = %e, "failed to stop stream");
    }
    if let Err(e) = recorder.dispose().await {
        warn!(error = %e, "failed to release capture device");
    }
    // Forward anything queued before the stop
    while let Some(event) = events.recv().await {
        if let RecorderEvent::Data(data) = event {
            if stdout.write_all(&data).await.is_err() {
                break;
            }
        }
    }
    let _ = stdout.flush().await;

    match outcome {
        Ok(_) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            presenter.error(&e.to_string());
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run `devices`
pub fn run_devices() -> ExitCode {
    let presenter = Presenter::new();
    let devices = match CpalPlatform::new().input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if devices.is_empty() {
        presenter.warn("No audio input devices found");
        return ExitCode::from(EXIT_SUCCESS);
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        let format = device
            .default_format
            .map(|f| format!(" ({})", f))
            .unwrap_or_default();
        presenter.output(&format!("{} {}{}", marker, device.name, format));
    }
    ExitCode::from(EXIT_SUCCESS)
}

/// Support table lines for one backend
pub fn encoder_support(recorder: &dyn Recorder) -> Vec<(AudioEncoder, bool)> {
    ALL_ENCODERS
        .iter()
        .map(|&encoder| (encoder, recorder.is_encoder_supported(encoder)))
        .collect()
}

/// Run `encoders`
pub fn run_encoders(only: Option<BackendKind>) -> ExitCode {
    let presenter = Presenter::new();
    let kinds = match only {
        Some(kind) => vec![kind],
        None => vec![BackendKind::Native, BackendKind::Helper],
    };

    for kind in kinds {
        let (recorder, _events) = create_recorder(kind, BackendOptions::default());
        presenter.info(&format!("{} ({})", kind, recorder.name()));
        for (encoder, supported) in encoder_support(&recorder) {
            presenter.key_value(
                &format!("  {:<10}", encoder.as_str()),
                if supported { "yes" } else { "no" },
            );
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::recording::ScriptedPlatform;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn scripted() -> (ScriptedPlatform, BackendOptions) {
        let platform = ScriptedPlatform::new();
        let options = BackendOptions::default().with_platform(Arc::new(platform.clone()));
        (platform, options)
    }

    #[test]
    fn record_options_use_defaults() {
        let options =
            build_record_options(PathBuf::from("a.wav"), None, &AppConfig::defaults()).unwrap();
        assert_eq!(options.config.encoder, AudioEncoder::Wav);
        assert_eq!(options.config.sample_rate, 44_100);
        assert_eq!(options.backend, BackendKind::Native);
        assert!(options.time_limit.is_none());
    }

    #[test]
    fn record_options_reject_bad_values() {
        let config = AppConfig {
            encoder: Some("mp3".into()),
            ..AppConfig::defaults()
        };
        assert!(build_record_options(PathBuf::from("a"), None, &config).is_err());

        let config = AppConfig {
            channels: Some(6),
            ..AppConfig::defaults()
        };
        assert!(build_record_options(PathBuf::from("a"), None, &config).is_err());

        assert!(
            build_record_options(PathBuf::from("a"), Some("soon"), &AppConfig::defaults())
                .is_err()
        );
    }

    #[test]
    fn stream_options_force_pcm() {
        let config = AppConfig {
            encoder: Some("flac".into()),
            ..AppConfig::defaults()
        };
        let options = build_stream_options(Some("2s"), &config).unwrap();
        assert_eq!(options.config.encoder, AudioEncoder::Pcm16Bits);
        assert_eq!(options.time_limit, Some(TimeLimit::from_secs(2)));
    }

    #[test]
    fn stream_banner_names_negotiated_format() {
        assert_eq!(
            stream_banner(PcmFormat::pcm16(48_000, 2)),
            "Streaming 48000 Hz, 2 ch, 16-bit PCM to stdout"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_reports_device_format() {
        let (platform, options) = scripted();
        platform.device().set_fixed_format(PcmFormat::pcm16(16_000, 1));
        let (recorder, _events) = create_recorder(BackendKind::Native, options);

        let config = RecordConfig::new(AudioEncoder::Pcm16Bits)
            .with_sample_rate(44_100)
            .with_channels(2);
        recorder.start_stream(config).await.unwrap();
        assert_eq!(recorder.input_format(), Some(PcmFormat::pcm16(16_000, 1)));
        recorder.stop().await.unwrap();
    }

    #[test]
    fn cli_values_override_environment() {
        let cli = AppConfig {
            device: Some("USB Mic".into()),
            ..Default::default()
        };
        let env = AppConfig {
            device: Some("Built-in".into()),
            helper_path: Some("/opt/fmedia".into()),
            ..Default::default()
        };
        let merged = AppConfig::defaults().merge(env).merge(cli);
        assert_eq!(merged.device.as_deref(), Some("USB Mic"));
        assert_eq!(merged.helper_path.as_deref(), Some("/opt/fmedia"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn capture_stops_at_time_limit() {
        let (platform, options) = scripted();
        let device = platform.device();
        let (recorder, mut events) = create_recorder(BackendKind::Native, options);
        let (_tx, rx) = mpsc::channel(1);
        let mut signals = ControlSignals::from_channel(rx);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let config = RecordConfig::new(AudioEncoder::Wav).with_sample_rate(8_000).with_channels(1);
        recorder.start(config, &path).await.unwrap();

        let feeder = std::thread::spawn(move || {
            for _ in 0..50 {
                device.push_chunk(&[100i16; 800]);
                std::thread::sleep(Duration::from_millis(5));
            }
        });

        let end = capture_until_done(
            &recorder,
            &mut events,
            &mut signals,
            Some(TimeLimit::from_millis(500)),
            &Presenter::new(),
        )
        .await
        .unwrap();
        feeder.join().unwrap();

        assert_eq!(end, CaptureEnd::TimeLimit);
        assert_eq!(recorder.stop().await.unwrap(), Some(path));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn signals_toggle_pause_and_shut_down() {
        let (_platform, options) = scripted();
        let (recorder, mut events) = create_recorder(BackendKind::Native, options);
        let (tx, rx) = mpsc::channel(4);
        let mut signals = ControlSignals::from_channel(rx);

        let dir = tempfile::tempdir().unwrap();
        recorder
            .start(RecordConfig::new(AudioEncoder::Wav), &dir.path().join("a.wav"))
            .await
            .unwrap();

        tx.send(ControlSignal::TogglePause).await.unwrap();
        tx.send(ControlSignal::Shutdown).await.unwrap();

        let end = capture_until_done(&recorder, &mut events, &mut signals, None, &Presenter::new())
            .await
            .unwrap();
        assert_eq!(end, CaptureEnd::Interrupted);
        assert!(recorder.is_paused());
        recorder.cancel().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stream_copies_live_pcm() {
        let (platform, options) = scripted();
        let device = platform.device();
        let (recorder, mut events) = create_recorder(BackendKind::Native, options);
        let (tx, rx) = mpsc::channel(1);
        let mut signals = ControlSignals::from_channel(rx);

        let config = RecordConfig::new(AudioEncoder::Pcm16Bits)
            .with_sample_rate(8_000)
            .with_channels(1);
        recorder.start_stream(config).await.unwrap();
        assert!(device.push_chunk(&[7i16; 80]));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(ControlSignal::Shutdown).await;
        });

        let mut out = Vec::new();
        let end = stream_until_done(&recorder, &mut events, &mut signals, None, &mut out)
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(end, CaptureEnd::Interrupted);
        assert_eq!(out.len(), 160);
        recorder.dispose().await.unwrap();
    }

    #[test]
    fn encoder_support_lists_every_encoder() {
        let (_platform, options) = scripted();
        let (recorder, _events) = create_recorder(BackendKind::Native, options);
        let table = encoder_support(&recorder);

        assert_eq!(table.len(), ALL_ENCODERS.len());
        assert!(table.contains(&(AudioEncoder::Wav, true)));
        assert!(table.contains(&(AudioEncoder::AacLc, false)));
    }
}
