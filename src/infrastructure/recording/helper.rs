//! Helper-process recorder adapter
//!
//! Capture runs inside an external fmedia-compatible executable. The first
//! launch starts recording and listens on a named command pipe; every later
//! control action is a short-lived second launch that addresses the running
//! instance through the same pipe name.

use std::env::consts::EXE_SUFFIX;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::events::EventSink;
use crate::application::ports::{Recorder, RecorderError};
use crate::domain::recording::{
    Amplitude, AudioEncoder, EncoderProfile, RecordConfig, RecordState, RecordingSession,
};

/// Command pipe the recording instance listens on
pub const HELPER_PIPE_NAME: &str = "record-engine";

/// Encoders the helper always provides
pub const HELPER_ENCODERS: &[AudioEncoder] = &[
    AudioEncoder::AacLc,
    AudioEncoder::AacHe,
    AudioEncoder::Flac,
    AudioEncoder::Opus,
    AudioEncoder::Wav,
];

/// How long the recording instance gets to exit after quit
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a directive launch may take to hand over its command
const DIRECTIVE_TIMEOUT: Duration = Duration::from_secs(5);

const HELPER_DIR: &str = "fmedia";
const HELPER_NAME: &str = "fmedia";

/// Input gain applied by the helper, in dB
const CAPTURE_GAIN_DB: &str = "6.0";

/// Control directive sent to a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Pause,
    Unpause,
    Stop,
    Quit,
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Stop => "stop",
            Self::Quit => "quit",
        }
    }
}

/// Default helper location: `<exe dir>/fmedia/fmedia`
pub fn locate_helper() -> Result<PathBuf, RecorderError> {
    let exe = std::env::current_exe()
        .map_err(|e| {
            RecorderError::ExternalProcessFailed(format!("cannot locate executable: {}", e))
        })?;
    let dir = exe.parent().ok_or_else(|| {
        RecorderError::ExternalProcessFailed("executable has no parent directory".into())
    })?;
    Ok(dir
        .join(HELPER_DIR)
        .join(format!("{}{}", HELPER_NAME, EXE_SUFFIX)))
}

/// Arguments of the launch that starts recording
pub fn build_start_args(config: &RecordConfig, output_path: &Path) -> Vec<String> {
    let mut args = vec![
        pipe_arg(),
        "--notui".to_string(),
        "--background".to_string(),
        "--record".to_string(),
        format!("--out={}", output_path.display()),
        format!("--rate={}", config.sample_rate),
        format!("--channels={}", config.num_channels),
        "--globcmd=listen".to_string(),
        format!("--gain={}", CAPTURE_GAIN_DB),
    ];
    if let Some(device) = &config.device_id {
        args.push(format!("--dev-capture={}", device));
    }
    args.extend(EncoderProfile::derive(config).helper_args());
    args
}

/// Arguments of a launch that only delivers `directive`
pub fn build_directive_args(directive: Directive) -> Vec<String> {
    vec![pipe_arg(), format!("--globcmd={}", directive.as_str())]
}

fn pipe_arg() -> String {
    format!("--globcmd.pipe-name={}", HELPER_PIPE_NAME)
}

/// Recorded time excluding pauses
#[derive(Debug, Default)]
struct WallClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl WallClock {
    fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn resume(&mut self) {
        self.running_since.get_or_insert_with(Instant::now);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: RecordingSession,
    clock: WallClock,
}

/// Recorder backed by an external helper executable
pub struct HelperProcessEngine {
    helper: Result<PathBuf, RecorderError>,
    /// Recording instance; also serializes control calls
    process: Mutex<Option<Child>>,
    state: StdMutex<SessionState>,
    events: EventSink,
}

impl HelperProcessEngine {
    /// Use the helper next to the running executable
    pub fn new(events: EventSink) -> Self {
        Self {
            helper: locate_helper(),
            process: Mutex::new(None),
            state: StdMutex::new(SessionState::default()),
            events,
        }
    }

    /// Use the helper at `path`
    pub fn with_helper(path: impl Into<PathBuf>, events: EventSink) -> Self {
        Self {
            helper: Ok(path.into()),
            ..Self::new(events)
        }
    }

    pub fn helper_path(&self) -> Option<&Path> {
        self.helper.as_ref().ok().map(PathBuf::as_path)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The helper path, if the executable exists
    fn require_helper(&self) -> Result<&Path, RecorderError> {
        let path = self.helper.as_ref().map_err(Clone::clone)?;
        if !path.is_file() {
            return Err(RecorderError::ExternalProcessFailed(format!(
                "helper not found at {}",
                path.display()
            )));
        }
        Ok(path.as_path())
    }

    fn spawn(helper: &Path, args: &[String]) -> Result<Child, RecorderError> {
        debug!(helper = %helper.display(), ?args, "launching helper");
        Command::new(helper)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    RecorderError::ExternalProcessFailed(format!(
                        "helper not found at {}",
                        helper.display()
                    ))
                } else {
                    RecorderError::ExternalProcessFailed(format!("failed to launch helper: {}", e))
                }
            })
    }

    /// Launch the helper with one directive and wait for it to hand over
    async fn send_directive(&self, directive: Directive) -> Result<(), RecorderError> {
        let helper = self.require_helper()?;
        let mut child = Self::spawn(helper, &build_directive_args(directive))?;

        match timeout(DIRECTIVE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                warn!(
                    directive = directive.as_str(),
                    %status,
                    "directive launch exited with failure"
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(RecorderError::ExternalProcessFailed(format!(
                    "directive {}: {}",
                    directive.as_str(),
                    e
                )))
            }
            Err(_) => {
                warn!(directive = directive.as_str(), "directive launch timed out");
            }
        }
        Ok(())
    }

    /// Stop and quit the recording instance, then wait for it to exit.
    /// Handles are released even when the helper hangs.
    async fn shut_down_instance(&self, process: &mut Option<Child>) {
        let Some(mut child) = process.take() else {
            return;
        };

        for directive in [Directive::Stop, Directive::Quit] {
            if let Err(e) = self.send_directive(directive).await {
                warn!(directive = directive.as_str(), error = %e, "directive not delivered");
            }
        }

        match timeout(EXIT_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "helper exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for helper"),
            Err(_) => warn!("helper did not exit within {:?}", EXIT_TIMEOUT),
        }
    }

    /// Close the session and report its output path
    fn finish_session(&self) -> Option<PathBuf> {
        let mut state = self.state();
        let path = state.session.output_path().map(Path::to_path_buf);
        let previous = state.session.finish();
        state.clock.reset();
        drop(state);

        if previous != RecordState::Stop {
            self.events.emit_state(RecordState::Stop);
        }
        path
    }
}

async fn remove_output(path: &Path) -> Result<(), RecorderError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecorderError::IoFailure(format!(
            "failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl Recorder for HelperProcessEngine {
    async fn start(&self, config: RecordConfig, path: &Path) -> Result<(), RecorderError> {
        config.validate()?;
        if !self.is_encoder_supported(config.encoder) {
            return Err(RecorderError::Unsupported(format!(
                "helper has no {} encoder",
                config.encoder
            )));
        }
        let helper = self.require_helper()?.to_path_buf();

        let mut process = self.process.lock().await;
        if process.is_some() || self.state().session.is_active() {
            info!("finishing previous session before restart");
            self.shut_down_instance(&mut process).await;
            self.finish_session();
        }

        remove_output(path).await?;

        let args = build_start_args(&config, path);
        let encoder = config.encoder;
        let child = Self::spawn(&helper, &args)?;
        *process = Some(child);

        {
            let mut state = self.state();
            state
                .session
                .begin(config, Some(path.to_path_buf()))
                .map_err(|e| RecorderError::CaptureFailed(e.to_string()))?;
            state.clock.start();
        }
        info!(encoder = %encoder, path = %path.display(), "helper recording started");
        self.events.emit_state(RecordState::Record);
        Ok(())
    }

    async fn start_stream(&self, _config: RecordConfig) -> Result<(), RecorderError> {
        Err(RecorderError::Unsupported(
            "live delivery is not available with the helper backend".into(),
        ))
    }

    async fn pause(&self) -> Result<(), RecorderError> {
        let _process = self.process.lock().await;
        if !self.state().session.is_recording() {
            return Ok(());
        }

        self.send_directive(Directive::Pause).await?;
        {
            let mut state = self.state();
            state.session.pause();
            state.clock.pause();
        }
        self.events.emit_state(RecordState::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<(), RecorderError> {
        let _process = self.process.lock().await;
        if !self.state().session.is_paused() {
            return Ok(());
        }

        self.send_directive(Directive::Unpause).await?;
        {
            let mut state = self.state();
            state.session.resume();
            state.clock.resume();
        }
        self.events.emit_state(RecordState::Record);
        Ok(())
    }

    async fn stop(&self) -> Result<Option<PathBuf>, RecorderError> {
        let mut process = self.process.lock().await;
        if !self.state().session.is_active() {
            return Ok(None);
        }

        self.shut_down_instance(&mut process).await;
        let Some(path) = self.finish_session() else {
            return Ok(None);
        };

        let written = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if written == 0 {
            debug!("helper produced no output, discarding");
            remove_output(&path).await?;
            return Ok(None);
        }

        info!(path = %path.display(), bytes = written, "helper recording finalized");
        Ok(Some(path))
    }

    async fn cancel(&self) -> Result<(), RecorderError> {
        let mut process = self.process.lock().await;
        self.shut_down_instance(&mut process).await;
        match self.finish_session() {
            Some(path) => remove_output(&path).await,
            None => Ok(()),
        }
    }

    async fn dispose(&self) -> Result<(), RecorderError> {
        {
            let mut process = self.process.lock().await;
            self.shut_down_instance(&mut process).await;
            self.finish_session();
        }
        self.events.close();
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.state().session.is_recording()
    }

    fn is_paused(&self) -> bool {
        self.state().session.is_paused()
    }

    fn amplitude(&self) -> Amplitude {
        Amplitude::silent()
    }

    fn recording_path(&self) -> Option<PathBuf> {
        self.state().session.output_path().map(Path::to_path_buf)
    }

    fn elapsed(&self) -> Duration {
        self.state().clock.elapsed()
    }

    fn is_encoder_supported(&self, encoder: AudioEncoder) -> bool {
        HELPER_ENCODERS.contains(&encoder)
    }

    fn name(&self) -> &'static str {
        "helper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_args_carry_format_and_encoder_flags() {
        let config = RecordConfig::new(AudioEncoder::AacLc)
            .with_sample_rate(48_000)
            .with_channels(1)
            .with_bit_rate(96_000);
        let args = build_start_args(&config, Path::new("/tmp/take.m4a"));

        assert_eq!(
            args,
            vec![
                "--globcmd.pipe-name=record-engine",
                "--notui",
                "--background",
                "--record",
                "--out=/tmp/take.m4a",
                "--rate=48000",
                "--channels=1",
                "--globcmd=listen",
                "--gain=6.0",
                "--aac-profile=LC",
                "--aac-quality=96",
            ]
        );
    }

    #[test]
    fn start_args_select_device() {
        let config = RecordConfig::new(AudioEncoder::Wav).with_device("2");
        let args = build_start_args(&config, Path::new("out.wav"));

        assert!(args.contains(&"--dev-capture=2".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--aac") || a.starts_with("--flac")));
    }

    #[test]
    fn directives_address_the_same_pipe() {
        assert_eq!(
            build_directive_args(Directive::Unpause),
            vec!["--globcmd.pipe-name=record-engine", "--globcmd=unpause"]
        );
        assert_eq!(build_directive_args(Directive::Quit)[1], "--globcmd=quit");
    }

    #[test]
    fn helper_sits_next_to_executable() {
        let path = locate_helper().unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();

        assert_eq!(path.parent().unwrap(), exe_dir.join("fmedia"));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("fmedia{}", EXE_SUFFIX)
        );
    }

    #[test]
    fn wall_clock_excludes_pauses() {
        let mut clock = WallClock::default();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.start();
        std::thread::sleep(Duration::from_millis(20));
        clock.pause();
        let paused_at = clock.elapsed();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.elapsed(), paused_at);
        assert!(paused_at >= Duration::from_millis(20));

        clock.resume();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.elapsed() > paused_at);

        clock.reset();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn missing_helper_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            HelperProcessEngine::with_helper(dir.path().join("absent"), EventSink::detached());

        let err = engine
            .start(RecordConfig::new(AudioEncoder::Wav), &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::ExternalProcessFailed(_)));
        assert!(!engine.is_recording());
    }

    #[tokio::test]
    async fn capability_gaps() {
        let engine = HelperProcessEngine::with_helper("/nonexistent", EventSink::detached());

        let err = engine
            .start_stream(RecordConfig::new(AudioEncoder::Pcm16Bits))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Unsupported(_)));
        assert_eq!(engine.amplitude(), Amplitude::silent());
        assert!(engine.is_encoder_supported(AudioEncoder::AacHe));
        assert!(!engine.is_encoder_supported(AudioEncoder::AmrNb));
        assert!(!engine.is_encoder_supported(AudioEncoder::Pcm16Bits));
    }

    #[tokio::test]
    async fn unsupported_encoder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            HelperProcessEngine::with_helper(dir.path().join("absent"), EventSink::detached());

        let err = engine
            .start(RecordConfig::new(AudioEncoder::AmrWb), &dir.path().join("out.amr"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Unsupported(_)));
    }

    #[tokio::test]
    async fn oversized_sample_rate_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let engine =
            HelperProcessEngine::with_helper(dir.path().join("absent"), EventSink::detached());

        let config = RecordConfig::new(AudioEncoder::Wav).with_sample_rate(3_000_000_000);
        let err = engine
            .start(config, &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn control_calls_without_session_are_no_ops() {
        let engine = HelperProcessEngine::with_helper("/nonexistent", EventSink::detached());

        engine.pause().await.unwrap();
        engine.resume().await.unwrap();
        assert_eq!(engine.stop().await.unwrap(), None);
        engine.cancel().await.unwrap();
        engine.dispose().await.unwrap();
        engine.dispose().await.unwrap();
    }
}
