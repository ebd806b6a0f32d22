//! CLI presenter for output formatting

use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::recording::{Amplitude, SILENCE_FLOOR_DB};

/// Lowest level the meter draws; anything quieter shows an empty bar
const METER_FLOOR_DB: f64 = -60.0;
const METER_WIDTH: usize = 20;

/// Presenter for CLI output formatting
pub struct Presenter {
    meter: Option<ProgressBar>,
}

impl Presenter {
    pub fn new() -> Self {
        Self { meter: None }
    }

    /// Show the live recording line
    pub fn start_meter(&mut self, message: &str) {
        let meter = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.red} {msg}")
        {
            meter.set_style(style);
        }
        meter.set_message(message.to_string());
        meter.enable_steady_tick(Duration::from_millis(80));
        self.meter = Some(meter);
    }

    pub fn update_meter(&self, amplitude: Amplitude, elapsed: Duration, paused: bool) {
        if let Some(ref meter) = self.meter {
            meter.set_message(self.format_meter(amplitude, elapsed, paused));
        }
    }

    /// Finish the live line with a status message
    pub fn meter_done(&mut self, message: &str) {
        if let Some(meter) = self.meter.take() {
            meter.finish_and_clear();
        }
        self.success(message);
    }

    pub fn stop_meter(&mut self) {
        if let Some(meter) = self.meter.take() {
            meter.finish_and_clear();
        }
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".cyan(), message);
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Output text to stdout
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Print a key-value pair (for config list)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }

    /// `mm:ss.t`
    pub fn format_elapsed(&self, elapsed: Duration) -> String {
        let tenths = elapsed.as_millis() / 100;
        format!(
            "{:02}:{:02}.{}",
            tenths / 600,
            (tenths / 10) % 60,
            tenths % 10
        )
    }

    /// Level bar plus elapsed time
    pub fn format_meter(&self, amplitude: Amplitude, elapsed: Duration, paused: bool) -> String {
        let filled = meter_fill(amplitude.current);
        let level = if amplitude.current <= SILENCE_FLOOR_DB {
            "  -inf".to_string()
        } else {
            format!("{:>6.1}", amplitude.current)
        };

        let bar = "█".repeat(filled);
        let bar = if filled > METER_WIDTH * 9 / 10 {
            bar.red()
        } else {
            bar.green()
        };

        format!(
            "{} [{}{}] {} dB  {}",
            if paused { "Paused   " } else { "Recording" },
            bar,
            "░".repeat(METER_WIDTH - filled),
            level,
            self.format_elapsed(elapsed)
        )
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of filled meter cells for a dBFS reading
fn meter_fill(db: f64) -> usize {
    let clamped = db.clamp(METER_FLOOR_DB, 0.0);
    let ratio = (clamped - METER_FLOOR_DB) / -METER_FLOOR_DB;
    (ratio * METER_WIDTH as f64).round() as usize
}
