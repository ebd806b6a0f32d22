//! Peak amplitude metering

/// Reading reported for silence and whenever no session is active
pub const SILENCE_FLOOR_DB: f64 = -160.0;

const FULL_SCALE_PCM16: f64 = 32767.0;
const FULL_SCALE_PCM8: f64 = 256.0;

/// Current and session-maximum level in dBFS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amplitude {
    pub current: f64,
    pub max: f64,
}

impl Amplitude {
    pub const fn silent() -> Self {
        Self {
            current: SILENCE_FLOOR_DB,
            max: SILENCE_FLOOR_DB,
        }
    }
}

impl Default for Amplitude {
    fn default() -> Self {
        Self::silent()
    }
}

/// Width of one PCM sample in a metered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// Signed 16-bit, host byte order
    Pcm16,
    /// Unsigned 8-bit
    Pcm8,
}

/// Peak meter with a running session maximum.
///
/// Levels are `20 * log10(peak / full_scale)`, clamped to
/// `[SILENCE_FLOOR_DB, 0]`. A zero peak reads as the floor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmplitudeMeter {
    reading: Amplitude,
}

impl AmplitudeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meter one buffer and fold it into the running maximum
    pub fn process(&mut self, data: &[u8], width: SampleWidth) -> Amplitude {
        let (peak, full_scale) = match width {
            SampleWidth::Pcm16 => (peak_pcm16(data), FULL_SCALE_PCM16),
            SampleWidth::Pcm8 => (peak_pcm8(data), FULL_SCALE_PCM8),
        };

        let current = to_decibels(peak, full_scale);
        self.reading.current = current;
        if current > self.reading.max {
            self.reading.max = current;
        }
        self.reading
    }

    /// Last reading, without side effects
    pub fn reading(&self) -> Amplitude {
        self.reading
    }

    /// Drop the current level to the floor, keeping the session maximum
    pub fn silence(&mut self) {
        self.reading.current = SILENCE_FLOOR_DB;
    }

    /// Back to the floor for both values
    pub fn reset(&mut self) {
        self.reading = Amplitude::silent();
    }
}

fn peak_pcm16(data: &[u8]) -> u32 {
    data.chunks_exact(2)
        .map(|pair| u32::from(i16::from_ne_bytes([pair[0], pair[1]]).unsigned_abs()))
        .max()
        .unwrap_or(0)
}

fn peak_pcm8(data: &[u8]) -> u32 {
    data.iter().copied().max().map(u32::from).unwrap_or(0)
}

fn to_decibels(peak: u32, full_scale: f64) -> f64 {
    if peak == 0 {
        return SILENCE_FLOOR_DB;
    }
    let db = 20.0 * (f64::from(peak) / full_scale).log10();
    db.clamp(SILENCE_FLOOR_DB, 0.0)
}
