//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod capture;
pub mod config;
pub mod recorder;

// Re-export common types
pub use capture::{
    CapturePlatform, CaptureSource, CapturedSample, DeviceInfo, PcmFormat, ReadOutcome,
    SampleStream, SourceDescriptor,
};
pub use config::ConfigStore;
pub use recorder::{Recorder, RecorderError};
