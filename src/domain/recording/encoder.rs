//! Audio encoder identifiers

use std::fmt;
use std::str::FromStr;

use crate::domain::error::EncoderParseError;

/// All known encoders, in display order
pub const ALL_ENCODERS: &[AudioEncoder] = &[
    AudioEncoder::AacLc,
    AudioEncoder::AacHe,
    AudioEncoder::AmrNb,
    AudioEncoder::AmrWb,
    AudioEncoder::Opus,
    AudioEncoder::Flac,
    AudioEncoder::Pcm16Bits,
    AudioEncoder::Wav,
];

/// Logical codec names a caller can request.
///
/// Which of these are actually usable depends on the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioEncoder {
    #[default]
    AacLc,
    AacHe,
    AmrNb,
    AmrWb,
    Opus,
    Flac,
    /// Raw signed 16-bit little-endian PCM, no container
    Pcm16Bits,
    /// Signed 16-bit PCM in a RIFF/WAVE container
    Wav,
}

impl AudioEncoder {
    /// Get the wire name for this encoder
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AacLc => "aacLc",
            Self::AacHe => "aacHe",
            Self::AmrNb => "amrNb",
            Self::AmrWb => "amrWb",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Pcm16Bits => "pcm16bits",
            Self::Wav => "wav",
        }
    }

    /// File extension usually associated with this encoder's output
    pub const fn file_extension(&self) -> &'static str {
        match self {
            Self::AacLc | Self::AacHe => "m4a",
            Self::AmrNb | Self::AmrWb => "amr",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Pcm16Bits => "pcm",
            Self::Wav => "wav",
        }
    }

    /// Whether the encoder produces uncompressed PCM samples
    pub const fn is_uncompressed(&self) -> bool {
        matches!(self, Self::Pcm16Bits | Self::Wav)
    }
}

impl FromStr for AudioEncoder {
    type Err = EncoderParseError;

    /// Accepts the wire names case-insensitively, with or without separators
    /// (`aacLc`, `aac-lc`, `AAC_LC` are equivalent).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "aaclc" => Ok(Self::AacLc),
            "aache" => Ok(Self::AacHe),
            "amrnb" => Ok(Self::AmrNb),
            "amrwb" => Ok(Self::AmrWb),
            "opus" => Ok(Self::Opus),
            "flac" => Ok(Self::Flac),
            "pcm16bits" | "pcm16" | "pcm" => Ok(Self::Pcm16Bits),
            "wav" => Ok(Self::Wav),
            _ => Err(EncoderParseError {
                input: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AudioEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
