//! Native engine integration tests driven by the scripted input

use std::path::Path;
use std::time::Duration;

use record_engine::application::ports::{PcmFormat, Recorder, RecorderError};
use record_engine::application::{EventStream, RecorderEvent, RecorderFacade};
use record_engine::domain::recording::{
    AudioEncoder, BackendKind, RecordConfig, RecordState, SILENCE_FLOOR_DB,
};
use record_engine::infrastructure::recording::native::DeviceCall;
use record_engine::infrastructure::recording::{
    create_recorder, BackendOptions, ScriptedDevice, ScriptedPlatform,
};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

fn native_recorder(platform: ScriptedPlatform) -> (RecorderFacade, EventStream, ScriptedDevice) {
    let device = platform.device();
    let options = BackendOptions::default().with_platform(std::sync::Arc::new(platform));
    let (recorder, events) = create_recorder(BackendKind::Native, options);
    (recorder, events, device)
}

fn wav_config() -> RecordConfig {
    RecordConfig::new(AudioEncoder::Wav)
        .with_sample_rate(8_000)
        .with_channels(1)
}

/// Push a chunk and wait until the engine has consumed it
fn feed(device: &ScriptedDevice, samples: &[i16]) {
    assert!(device.push_chunk(samples), "device is not running");
    assert!(device.wait_idle(IDLE_TIMEOUT), "engine did not consume chunk");
}

fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(Result::unwrap).collect();
    (spec, samples)
}

fn states(events: &mut EventStream) -> Vec<RecordState> {
    events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            RecorderEvent::State(state) => Some(state),
            RecorderEvent::Data(_) => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wav_contains_every_delivered_sample() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    assert!(recorder.is_recording());
    assert_eq!(recorder.recording_path(), Some(path.clone()));

    let first: Vec<i16> = (0..800).map(|i| (i * 10) as i16).collect();
    let second: Vec<i16> = (0..800).map(|i| -(i as i16)).collect();
    feed(&device, &first);
    feed(&device, &second);
    assert_eq!(recorder.elapsed(), Duration::from_millis(200));

    let finished = recorder.stop().await.unwrap();
    assert_eq!(finished, Some(path.clone()));
    assert!(!recorder.is_recording());
    assert_eq!(recorder.recording_path(), None);

    let (spec, samples) = read_wav(&path);
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(samples, [first, second].concat());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 44 + 3_200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_resume_leaves_no_gap() {
    let (recorder, mut events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    feed(&device, &[1; 800]);

    recorder.pause().await.unwrap();
    assert!(recorder.is_paused());
    // Device time passes while paused; nothing is captured
    assert!(!device.push_chunk(&[9; 8_000]));
    device.advance(Duration::from_secs(3));

    recorder.resume().await.unwrap();
    assert!(recorder.is_recording());
    feed(&device, &[2; 400]);

    assert_eq!(recorder.elapsed(), Duration::from_millis(150));
    recorder.stop().await.unwrap();

    let (_, samples) = read_wav(&path);
    assert_eq!(samples.len(), 1_200);
    assert!(samples[..800].iter().all(|&s| s == 1));
    assert!(samples[800..].iter().all(|&s| s == 2));

    assert_eq!(
        states(&mut events),
        vec![
            RecordState::Record,
            RecordState::Pause,
            RecordState::Record,
            RecordState::Stop
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_restarts_source_at_last_position() {
    let platform = ScriptedPlatform::new();
    platform.device().set_honor_position(true);
    let (recorder, _events, device) = native_recorder(platform);
    let dir = tempfile::tempdir().unwrap();

    recorder.start(wav_config(), &dir.path().join("a.wav")).await.unwrap();
    feed(&device, &[0; 80]);
    recorder.pause().await.unwrap();
    device.advance(Duration::from_secs(1));
    recorder.resume().await.unwrap();

    assert_eq!(device.clock(), Duration::from_millis(10));
    feed(&device, &[0; 80]);
    assert_eq!(recorder.elapsed(), Duration::from_millis(20));
    recorder.stop().await.unwrap();

    assert_eq!(
        device.calls(),
        vec![
            DeviceCall::Open,
            DeviceCall::Start(None),
            DeviceCall::Pause,
            DeviceCall::Start(Some(Duration::from_millis(10))),
            DeviceCall::Stop,
            DeviceCall::Shutdown,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_without_samples_discards_file() {
    let (recorder, mut events, _device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    assert!(path.exists());

    assert_eq!(recorder.stop().await.unwrap(), None);
    assert!(!path.exists());
    assert_eq!(states(&mut events), vec![RecordState::Record, RecordState::Stop]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_deletes_partial_output() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    feed(&device, &[5; 800]);
    recorder.cancel().await.unwrap();

    assert!(!path.exists());
    assert!(!recorder.is_recording());
    assert_eq!(recorder.elapsed(), Duration::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsupported_requests_are_rejected() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();

    let m4a = dir.path().join("a.m4a");
    let err = recorder
        .start(RecordConfig::new(AudioEncoder::AacLc), &m4a)
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Unsupported(_)));
    assert!(!m4a.exists());

    let err = recorder
        .start_stream(RecordConfig::new(AudioEncoder::Wav))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Unsupported(_)));

    let err = recorder
        .start(wav_config().with_channels(3), &dir.path().join("a.wav"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::InvalidConfig(_)));

    let err = recorder
        .start(wav_config().with_sample_rate(u32::MAX), &dir.path().join("b.wav"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::InvalidConfig(_)));
    assert!(!dir.path().join("b.wav").exists());

    assert!(!recorder.is_recording());
    assert!(device.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_device_open_leaves_recorder_stopped() {
    let platform = ScriptedPlatform::new();
    platform.device().fail_next_open("device busy");
    let (recorder, mut events, _device) = native_recorder(platform);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");

    let err = recorder.start(wav_config(), &path).await.unwrap_err();
    assert!(matches!(err, RecorderError::ResourceAcquisitionFailed(_)));
    assert!(!recorder.is_recording());
    assert!(!path.exists());
    assert!(states(&mut events).is_empty());

    // The next attempt succeeds
    recorder.start(wav_config(), &path).await.unwrap();
    recorder.cancel().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_delivers_raw_pcm() {
    let (recorder, mut events, device) = native_recorder(ScriptedPlatform::new());
    let config = RecordConfig::new(AudioEncoder::Pcm16Bits)
        .with_sample_rate(8_000)
        .with_channels(1);

    recorder.start_stream(config).await.unwrap();
    assert_eq!(recorder.recording_path(), None);
    feed(&device, &[1000, -1000, 500, -500]);

    // Streaming writes nothing, so stop reports no file
    assert_eq!(recorder.stop().await.unwrap(), None);

    let data: Vec<u8> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            RecorderEvent::Data(data) => Some(data),
            RecorderEvent::State(_) => None,
        })
        .flatten()
        .collect();
    let expected: Vec<u8> = [1000i16, -1000, 500, -500]
        .iter()
        .flat_map(|s| s.to_ne_bytes())
        .collect();
    assert_eq!(data, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn amplitude_tracks_peak_and_maximum() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(recorder.amplitude().current, SILENCE_FLOOR_DB);
    recorder.start(wav_config(), &dir.path().join("a.wav")).await.unwrap();

    feed(&device, &[i16::MAX, 0, 0, 0]);
    let loud = recorder.amplitude();
    assert!(loud.current.abs() < 1e-6);

    feed(&device, &[3_277, 0]);
    let quiet = recorder.amplitude();
    assert!((quiet.current + 20.0).abs() < 0.01);
    assert!(quiet.max.abs() < 1e-6);

    recorder.stop().await.unwrap();
    let after = recorder.amplitude();
    assert_eq!(after.current, SILENCE_FLOOR_DB);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_format_wins_over_request() {
    let platform = ScriptedPlatform::new();
    platform.device().set_fixed_format(PcmFormat::pcm16(16_000, 2));
    let (recorder, _events, device) = native_recorder(platform);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    assert_eq!(recorder.input_format(), Some(PcmFormat::pcm16(16_000, 2)));
    feed(&device, &[0; 320]);
    recorder.stop().await.unwrap();
    assert_eq!(recorder.input_format(), None);

    let (spec, samples) = read_wav(&path);
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 2);
    assert_eq!(samples.len(), 320);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_failure_keeps_written_audio() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    feed(&device, &[4; 800]);
    device.fail("unplugged");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Capture has stopped; later chunks never reach the file
    device.push_chunk(&[8; 800]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorder.is_recording());

    assert_eq!(recorder.stop().await.unwrap(), Some(path.clone()));
    let (_, samples) = read_wav(&path);
    assert_eq!(samples, vec![4; 800]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_finalizes_previous_session() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.wav");
    let second = dir.path().join("second.wav");

    recorder.start(wav_config(), &first).await.unwrap();
    feed(&device, &[3; 80]);

    recorder.start(wav_config(), &second).await.unwrap();
    assert_eq!(recorder.recording_path(), Some(second.clone()));
    assert_eq!(recorder.elapsed(), Duration::ZERO);
    feed(&device, &[6; 160]);
    recorder.stop().await.unwrap();

    assert_eq!(read_wav(&first).1, vec![3; 80]);
    assert_eq!(read_wav(&second).1, vec![6; 160]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flac_output_is_written() {
    let (recorder, _events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.flac");
    let config = RecordConfig::new(AudioEncoder::Flac)
        .with_sample_rate(16_000)
        .with_channels(1);

    recorder.start(config, &path).await.unwrap();
    let tone: Vec<i16> = (0..4_800).map(|i| ((i % 64) * 256) as i16).collect();
    feed(&device, &tone);
    assert_eq!(recorder.stop().await.unwrap(), Some(path.clone()));

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"fLaC"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispose_is_idempotent_and_closes_events() {
    let (recorder, mut events, device) = native_recorder(ScriptedPlatform::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");

    recorder.start(wav_config(), &path).await.unwrap();
    feed(&device, &[1; 80]);

    recorder.dispose().await.unwrap();
    recorder.dispose().await.unwrap();
    assert!(!recorder.is_recording());
    // Dispose keeps what was recorded
    assert_eq!(read_wav(&path).1.len(), 80);

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert_eq!(seen.last(), Some(&RecorderEvent::State(RecordState::Stop)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controls_outside_a_session_are_no_ops() {
    let (recorder, mut events, _device) = native_recorder(ScriptedPlatform::new());

    recorder.pause().await.unwrap();
    recorder.resume().await.unwrap();
    assert_eq!(recorder.stop().await.unwrap(), None);
    recorder.cancel().await.unwrap();

    assert!(!recorder.is_paused());
    assert!(states(&mut events).is_empty());
}
