//! record-engine - microphone capture with pause/resume and live metering
//!
//! Records from an input device to a file (raw PCM, WAV, FLAC, Opus, or the
//! helper's AAC) or delivers raw PCM to a live consumer.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Encoders, record config, profile derivation, amplitude meter,
//!   and the session state machine
//! - **Application**: The `Recorder` control surface, the capture framework
//!   ports, the event channel, and the backend facade
//! - **Infrastructure**: The native capture engine (cpal or scripted input),
//!   the helper-process engine, output sinks, config store, and logging
//! - **CLI**: Command-line interface, argument parsing, and signal handling

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
