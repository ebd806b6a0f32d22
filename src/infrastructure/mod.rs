//! Infrastructure layer - Adapter implementations
//!
//! Concrete capture backends, output sinks, the config store and logging.

pub mod config;
pub mod logging;
pub mod recording;

pub use config::XdgConfigStore;
pub use logging::init_logging;
pub use recording::{create_recorder, BackendOptions, HelperProcessEngine, NativeCaptureEngine};
