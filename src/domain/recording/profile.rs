//! Output format derivation
//!
//! Maps a logical encoder name plus the session's bit rate, sample rate and
//! channel count onto the concrete parameters an encoder needs. The same
//! derivation feeds the native sink writers and the helper process flags.

use super::encoder::AudioEncoder;
use super::record_config::RecordConfig;

/// Lowest AAC quality value accepted by encoders
pub const AAC_QUALITY_MIN: u32 = 8;

/// Highest AAC quality value accepted by encoders
pub const AAC_QUALITY_MAX: u32 = 800;

/// Lowest Opus bitrate in kbps
pub const OPUS_KBPS_MIN: u32 = 6;

/// Highest Opus bitrate in kbps
pub const OPUS_KBPS_MAX: u32 = 510;

/// FLAC compression level (fixed, bit rate is irrelevant for lossless output)
pub const FLAC_COMPRESSION_LEVEL: u8 = 6;

/// Sample depth used by every profile
pub const PCM_BITS_PER_SAMPLE: u16 = 16;

/// AAC profile tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    Lc,
    HeV2,
}

impl AacProfile {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lc => "LC",
            Self::HeV2 => "HEv2",
        }
    }
}

/// Codec-specific tuning value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecTuning {
    Aac { profile: AacProfile, quality: u32 },
    Flac { compression_level: u8 },
    Opus { bitrate_kbps: u32 },
    Amr,
    Pcm {
        block_align: u16,
        bytes_per_second: u32,
        /// Every sample unit can be decoded on its own
        all_samples_independent: bool,
    },
}

/// Concrete output parameters for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub encoder: AudioEncoder,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    /// Requested average bit rate, passed through for compressed formats
    pub bit_rate: Option<u32>,
    pub tuning: CodecTuning,
}

impl EncoderProfile {
    /// Derive the profile for a session config
    pub fn derive(config: &RecordConfig) -> Self {
        Self::for_format(
            config.encoder,
            config.bit_rate,
            config.sample_rate,
            config.num_channels,
        )
    }

    /// Derive the profile from its individual inputs
    pub fn for_format(
        encoder: AudioEncoder,
        bit_rate: u32,
        sample_rate: u32,
        num_channels: u16,
    ) -> Self {
        let (tuning, bit_rate) = match encoder {
            AudioEncoder::AacLc => (
                CodecTuning::Aac {
                    profile: AacProfile::Lc,
                    quality: aac_quality(bit_rate),
                },
                Some(bit_rate),
            ),
            AudioEncoder::AacHe => (
                CodecTuning::Aac {
                    profile: AacProfile::HeV2,
                    quality: aac_quality(bit_rate),
                },
                Some(bit_rate),
            ),
            AudioEncoder::Flac => (
                CodecTuning::Flac {
                    compression_level: FLAC_COMPRESSION_LEVEL,
                },
                None,
            ),
            AudioEncoder::Opus => (
                CodecTuning::Opus {
                    bitrate_kbps: opus_bitrate_kbps(bit_rate),
                },
                Some(bit_rate),
            ),
            AudioEncoder::AmrNb | AudioEncoder::AmrWb => (CodecTuning::Amr, None),
            AudioEncoder::Pcm16Bits | AudioEncoder::Wav => {
                let block_align = num_channels.saturating_mul(PCM_BITS_PER_SAMPLE / 8);
                (
                    CodecTuning::Pcm {
                        block_align,
                        bytes_per_second: u32::from(block_align).saturating_mul(sample_rate),
                        all_samples_independent: true,
                    },
                    None,
                )
            }
        };

        Self {
            encoder,
            sample_rate,
            num_channels,
            bits_per_sample: PCM_BITS_PER_SAMPLE,
            bit_rate,
            tuning,
        }
    }

    /// Same profile rebound to the format the capture device actually delivers
    pub fn with_input_format(self, sample_rate: u32, num_channels: u16) -> Self {
        Self::for_format(
            self.encoder,
            self.bit_rate.unwrap_or_default(),
            sample_rate,
            num_channels,
        )
    }

    /// Encoder flags for the helper process command line
    pub fn helper_args(&self) -> Vec<String> {
        match self.tuning {
            CodecTuning::Aac { profile, quality } => vec![
                format!("--aac-profile={}", profile.as_str()),
                format!("--aac-quality={}", quality),
            ],
            CodecTuning::Flac { compression_level } => vec![
                format!("--flac-compression={}", compression_level),
                "--format=int16".to_string(),
            ],
            CodecTuning::Opus { bitrate_kbps } => vec![format!("--opus.bitrate={}", bitrate_kbps)],
            CodecTuning::Amr | CodecTuning::Pcm { .. } => Vec::new(),
        }
    }
}

/// AAC quality from a bit rate in bits per second
pub fn aac_quality(bit_rate: u32) -> u32 {
    (bit_rate / 1000).clamp(AAC_QUALITY_MIN, AAC_QUALITY_MAX)
}

/// Opus bitrate in kbps from a bit rate in bits per second
pub fn opus_bitrate_kbps(bit_rate: u32) -> u32 {
    (bit_rate / 1000).clamp(OPUS_KBPS_MIN, OPUS_KBPS_MAX)
}
