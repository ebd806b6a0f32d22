//! In-process capture backend
//!
//! `NativeCaptureEngine` drives any `CapturePlatform`. `CpalPlatform` talks to
//! the system audio host; `ScriptedPlatform` is fed programmatically.

mod cpal_source;
mod engine;
mod reader;
mod scripted;

pub use cpal_source::CpalPlatform;
pub use engine::NativeCaptureEngine;
pub use reader::{AsyncSampleReader, ReadCallback};
pub use scripted::{DeviceCall, ScriptedDevice, ScriptedPlatform, SCRIPTED_DEVICE_ID};
