//! Recording session state machine

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::amplitude::{Amplitude, AmplitudeMeter, SampleWidth};
use super::record_config::RecordConfig;
use super::state::RecordState;

/// Error when an invalid state transition is attempted
#[derive(Debug, Clone, Error)]
#[error("Invalid state transition: cannot {action} while in {current_state} state")]
pub struct InvalidStateTransition {
    pub current_state: RecordState,
    pub action: String,
}

/// Mutable state of one recording session, shared by both backends.
///
/// State machine:
///   STOP -> RECORD (begin)
///   RECORD -> PAUSE (pause)
///   PAUSE -> RECORD (resume)
///   RECORD | PAUSE -> STOP (finish)
///
/// Sample timestamps are rebased so the output timeline starts at zero. The
/// first sample after a resume is rebased to continue exactly where the last
/// delivered sample ended, so time spent paused never shows up in the output.
#[derive(Debug, Default)]
pub struct RecordingSession {
    state: RecordState,
    config: Option<RecordConfig>,
    output_path: Option<PathBuf>,
    /// Raw timestamp mapped to zero, in nanoseconds
    base: Option<i128>,
    /// Raw end of the last delivered sample
    last_raw_end: Duration,
    /// Rebased end of the last delivered sample
    last_end: Duration,
    pending_resume: bool,
    bytes_written: u64,
    meter: AmplitudeMeter,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordState::Record
    }

    pub fn is_paused(&self) -> bool {
        self.state == RecordState::Pause
    }

    /// Whether a session is open (recording or paused)
    pub fn is_active(&self) -> bool {
        self.state != RecordState::Stop
    }

    pub fn config(&self) -> Option<&RecordConfig> {
        self.config.as_ref()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Transition from STOP to RECORD, reinitializing all session state.
    /// `output_path` is `None` for live-delivery sessions.
    pub fn begin(
        &mut self,
        config: RecordConfig,
        output_path: Option<PathBuf>,
    ) -> Result<(), InvalidStateTransition> {
        if self.state != RecordState::Stop {
            return Err(InvalidStateTransition {
                current_state: self.state,
                action: "start recording".to_string(),
            });
        }

        self.clear_timeline();
        self.meter.reset();
        self.config = Some(config);
        self.output_path = output_path;
        self.state = RecordState::Record;
        Ok(())
    }

    /// RECORD -> PAUSE. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        if self.state != RecordState::Record {
            return false;
        }
        self.state = RecordState::Pause;
        true
    }

    /// PAUSE -> RECORD. Returns whether the state changed.
    pub fn resume(&mut self) -> bool {
        if self.state != RecordState::Pause {
            return false;
        }
        self.pending_resume = self.base.is_some();
        self.state = RecordState::Record;
        true
    }

    /// Close the session. Returns the state it was in.
    ///
    /// The timeline and counters return to zero, config and path are
    /// cleared, and the current amplitude drops to the floor. The maximum
    /// amplitude is kept until the next `begin`.
    pub fn finish(&mut self) -> RecordState {
        let previous = self.state;
        self.state = RecordState::Stop;
        self.config = None;
        self.output_path = None;
        self.clear_timeline();
        self.meter.silence();
        previous
    }

    /// Register a delivered sample and return its rebased timestamp
    pub fn on_sample(&mut self, raw: Duration, duration: Duration) -> Duration {
        let raw_nanos = raw.as_nanos() as i128;

        let base = match self.base {
            Some(base) if !self.pending_resume => base,
            Some(_) => raw_nanos - self.last_end.as_nanos() as i128,
            None => raw_nanos,
        };
        self.base = Some(base);
        self.pending_resume = false;

        let rebased = Duration::from_nanos((raw_nanos - base).max(0) as u64);
        self.last_raw_end = raw + duration;
        self.last_end = rebased + duration;
        rebased
    }

    /// Count bytes handed to the sink
    pub fn add_written(&mut self, bytes: usize) {
        self.bytes_written += bytes as u64;
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether any sample has arrived since `begin`
    pub fn has_samples(&self) -> bool {
        self.base.is_some()
    }

    /// Meter a raw buffer
    pub fn update_amplitude(&mut self, data: &[u8], width: SampleWidth) -> Amplitude {
        self.meter.process(data, width)
    }

    pub fn amplitude(&self) -> Amplitude {
        self.meter.reading()
    }

    /// Output timeline position reached so far
    pub fn elapsed(&self) -> Duration {
        self.last_end
    }

    /// Device position to restart the source at after a pause
    pub fn resume_position(&self) -> Option<Duration> {
        self.base.map(|_| self.last_raw_end)
    }

    fn clear_timeline(&mut self) {
        self.base = None;
        self.last_raw_end = Duration::ZERO;
        self.last_end = Duration::ZERO;
        self.pending_resume = false;
        self.bytes_written = 0;
    }
}
