//! Recorder state value object

use std::fmt;

/// Recorder states.
///
/// Exactly one is current at any time. `Stop` is both the initial state and
/// the state every session returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordState {
    Pause,
    Record,
    #[default]
    Stop,
}

impl RecordState {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Record => "record",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_stop() {
        assert_eq!(RecordState::default(), RecordState::Stop);
    }

    #[test]
    fn state_display() {
        assert_eq!(RecordState::Pause.to_string(), "pause");
        assert_eq!(RecordState::Record.to_string(), "record");
        assert_eq!(RecordState::Stop.to_string(), "stop");
    }
}
