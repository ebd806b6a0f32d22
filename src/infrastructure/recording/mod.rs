//! Recording infrastructure module
//!
//! Two backends implement the `Recorder` port: the native engine, which
//! drives an in-process capture platform (cpal by default), and the helper
//! engine, which drives an external fmedia-compatible executable.

pub mod helper;
pub mod native;
pub mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::application::events::EventStream;
use crate::application::facade::RecorderFacade;
use crate::application::ports::{CapturePlatform, Recorder};
use crate::domain::recording::BackendKind;

pub use helper::{HelperProcessEngine, HELPER_ENCODERS};
pub use native::{CpalPlatform, NativeCaptureEngine, ScriptedDevice, ScriptedPlatform};

/// Construction options for `create_recorder`
#[derive(Clone, Default)]
pub struct BackendOptions {
    /// Capture platform for the native backend; cpal when unset
    pub platform: Option<Arc<dyn CapturePlatform>>,
    /// Helper executable; next to the running binary when unset
    pub helper_path: Option<PathBuf>,
}

impl BackendOptions {
    pub fn with_platform(mut self, platform: Arc<dyn CapturePlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_helper_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.helper_path = Some(path.into());
        self
    }
}

/// Build the facade over the backend selected by `kind`
pub fn create_recorder(
    kind: BackendKind,
    options: BackendOptions,
) -> (RecorderFacade, EventStream) {
    info!(backend = %kind, "creating recorder");
    RecorderFacade::new(kind, move |events| -> Box<dyn Recorder> {
        match kind {
            BackendKind::Native => {
                let platform = options
                    .platform
                    .unwrap_or_else(|| Arc::new(CpalPlatform::new()) as Arc<dyn CapturePlatform>);
                Box::new(NativeCaptureEngine::new(platform, events))
            }
            BackendKind::Helper => match options.helper_path {
                Some(path) => Box::new(HelperProcessEngine::with_helper(path, events)),
                None => Box::new(HelperProcessEngine::new(events)),
            },
        }
    })
}
