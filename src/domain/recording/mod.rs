//! Recording domain module

mod amplitude;
mod backend;
mod encoder;
mod profile;
mod record_config;
mod session;
mod state;
mod time_limit;

pub use amplitude::{Amplitude, AmplitudeMeter, SampleWidth, SILENCE_FLOOR_DB};
pub use backend::{BackendKind, BackendParseError};
pub use encoder::{AudioEncoder, ALL_ENCODERS};
pub use profile::{AacProfile, CodecTuning, EncoderProfile, FLAC_COMPRESSION_LEVEL};
pub use record_config::{
    RecordConfig, DEFAULT_BIT_RATE, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE,
};
pub use session::{InvalidStateTransition, RecordingSession};
pub use state::RecordState;
pub use time_limit::TimeLimit;
