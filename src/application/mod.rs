//! Application layer - Control surface and port interfaces
//!
//! Contains the recorder facade, the event channel, and trait definitions
//! for external system interactions.

pub mod events;
pub mod facade;
pub mod ports;

pub use events::{event_channel, EventSink, EventStream, RecorderEvent};
pub use facade::RecorderFacade;
