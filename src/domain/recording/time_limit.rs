//! Recording time limit value object

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::TimeLimitParseError;

/// Upper bound on how long the CLI records before stopping on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeLimit {
    milliseconds: u64,
}

impl TimeLimit {
    pub const fn from_millis(ms: u64) -> Self {
        Self { milliseconds: ms }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            milliseconds: secs * 1000,
        }
    }

    pub const fn as_millis(&self) -> u64 {
        self.milliseconds
    }

    pub const fn as_std(&self) -> Duration {
        Duration::from_millis(self.milliseconds)
    }
}

impl FromStr for TimeLimit {
    type Err = TimeLimitParseError;

    /// Accepts `500ms`, `30s`, `2m`, `2m30s` (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeLimitParseError {
            input: s.to_string(),
        };
        let input = s.trim().to_lowercase();

        if let Some(ms) = input.strip_suffix("ms") {
            let value: u64 = ms.parse().map_err(|_| invalid())?;
            if value == 0 {
                return Err(invalid());
            }
            return Ok(Self::from_millis(value));
        }

        let mut total_secs: u64 = 0;
        let mut digits = String::new();
        let mut last_unit = None;

        for ch in input.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                'm' | 's' if !digits.is_empty() => {
                    // Minutes must come before seconds, each at most once
                    if last_unit == Some('s') || last_unit == Some(ch) {
                        return Err(invalid());
                    }
                    let value: u64 = digits.parse().map_err(|_| invalid())?;
                    total_secs += if ch == 'm' { value * 60 } else { value };
                    digits.clear();
                    last_unit = Some(ch);
                }
                _ => return Err(invalid()),
            }
        }

        if !digits.is_empty() || last_unit.is_none() || total_secs == 0 {
            return Err(invalid());
        }

        Ok(Self::from_secs(total_secs))
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milliseconds % 1000 != 0 {
            return write!(f, "{}ms", self.milliseconds);
        }

        let total_secs = self.milliseconds / 1000;
        let (minutes, seconds) = (total_secs / 60, total_secs % 60);
        match (minutes, seconds) {
            (0, s) => write!(f, "{}s", s),
            (m, 0) => write!(f, "{}m", m),
            (m, s) => write!(f, "{}m{}s", m, s),
        }
    }
}
