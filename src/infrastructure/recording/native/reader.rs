//! Asynchronous sample reader
//!
//! Owns a `SampleStream` on a worker thread. Each `request_sample` call
//! produces exactly one completion on the registered callback; a second
//! request is refused while one is outstanding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;

use tracing::{debug, trace};

use crate::application::ports::{ReadOutcome, RecorderError, SampleStream};

/// Receiver of read completions
pub trait ReadCallback: Send + Sync {
    /// Called on the reader thread. `token` is the value the reader was
    /// created with.
    fn on_read_complete(&self, token: u64, outcome: ReadOutcome);
}

/// Single-request reader over a blocking sample stream
pub struct AsyncSampleReader {
    requests: Mutex<Option<Sender<()>>>,
    in_flight: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl AsyncSampleReader {
    /// Start the worker thread.
    ///
    /// The callback is held weakly; once it is dropped the worker exits.
    pub fn spawn(
        stream: Box<dyn SampleStream>,
        callback: Weak<dyn ReadCallback>,
        token: u64,
    ) -> Result<Self, RecorderError> {
        let (sender, receiver) = mpsc::channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            stream,
            callback,
            token,
            requests: receiver,
            in_flight: Arc::clone(&in_flight),
            cancelled: Arc::clone(&cancelled),
        };
        thread::Builder::new()
            .name("sample-reader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                RecorderError::ResourceAcquisitionFailed(format!("reader thread: {}", e))
            })?;

        Ok(Self {
            requests: Mutex::new(Some(sender)),
            in_flight,
            cancelled,
        })
    }

    /// Ask for the next sample.
    ///
    /// # Returns
    /// `false` if a request is already outstanding
    pub fn request_sample(&self) -> Result<bool, RecorderError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RecorderError::CaptureFailed("reader was cancelled".into()));
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let guard = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = guard.as_ref().map(|tx| tx.send(()).is_ok()).unwrap_or(false);
        if !sent {
            self.in_flight.store(false, Ordering::SeqCst);
            return Err(RecorderError::CaptureFailed("reader thread has exited".into()));
        }
        Ok(true)
    }

    /// Whether a request is waiting for its completion
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop delivering completions. Does not wait for the worker, which may
    /// be inside the callback right now.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("sample reader cancelled");
    }
}

impl Drop for AsyncSampleReader {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Worker {
    stream: Box<dyn SampleStream>,
    callback: Weak<dyn ReadCallback>,
    token: u64,
    requests: Receiver<()>,
    in_flight: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) {
        while self.requests.recv().is_ok() {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let Some(outcome) = self.stream.next_sample() else {
                trace!("sample stream closed");
                break;
            };
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let Some(callback) = self.callback.upgrade() else {
                break;
            };
            // Cleared before the callback so it can re-arm from inside
            self.in_flight.store(false, Ordering::SeqCst);
            callback.on_read_complete(self.token, outcome);
        }
        self.in_flight.store(false, Ordering::SeqCst);
        trace!(token = self.token, "sample reader exited");
    }
}
