//! Recorder event channel
//!
//! Engines emit from whatever thread they run on; the caller drains the
//! stream on its own task. Emission never blocks and preserves order.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::domain::recording::RecordState;

/// Notification produced by a recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// The recorder committed a new state
    State(RecordState),
    /// Raw PCM chunk, live-delivery sessions only
    Data(Vec<u8>),
}

/// Sending half, cloned into every engine component that emits
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Arc<Mutex<Option<UnboundedSender<RecorderEvent>>>>,
}

/// Receiving half, owned by the caller
#[derive(Debug)]
pub struct EventStream {
    receiver: UnboundedReceiver<RecorderEvent>,
}

/// Create a connected sink/stream pair
pub fn event_channel() -> (EventSink, EventStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventSink {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        EventStream { receiver },
    )
}

impl EventSink {
    /// A sink whose events go nowhere
    pub fn detached() -> Self {
        Self {
            sender: Arc::new(Mutex::new(None)),
        }
    }

    pub fn emit(&self, event: RecorderEvent) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = guard.as_ref() {
            // Receiver gone means nobody is listening anymore
            let _ = sender.send(event);
        }
    }

    pub fn emit_state(&self, state: RecordState) {
        self.emit(RecorderEvent::State(state));
    }

    pub fn emit_data(&self, data: Vec<u8>) {
        self.emit(RecorderEvent::Data(data));
    }

    /// Drop the sender for every clone. Later emissions are discarded and
    /// the stream ends once drained.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl EventStream {
    /// Next event, or `None` once the sink is closed and drained
    pub async fn recv(&mut self) -> Option<RecorderEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<RecorderEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<RecorderEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut stream) = event_channel();
        sink.emit_state(RecordState::Record);
        sink.emit_data(vec![1, 2]);
        sink.emit_state(RecordState::Stop);

        assert_eq!(stream.recv().await, Some(RecorderEvent::State(RecordState::Record)));
        assert_eq!(stream.recv().await, Some(RecorderEvent::Data(vec![1, 2])));
        assert_eq!(stream.recv().await, Some(RecorderEvent::State(RecordState::Stop)));
    }

    #[tokio::test]
    async fn close_ends_stream_for_all_clones() {
        let (sink, mut stream) = event_channel();
        let clone = sink.clone();
        sink.emit_state(RecordState::Record);
        sink.close();
        clone.emit_state(RecordState::Stop);

        assert!(clone.is_closed());
        assert_eq!(stream.recv().await, Some(RecorderEvent::State(RecordState::Record)));
        assert_eq!(stream.recv().await, None);
    }

    #[test]
    fn emitting_from_another_thread() {
        let (sink, mut stream) = event_channel();
        let worker = sink.clone();
        std::thread::spawn(move || worker.emit_data(vec![7]))
            .join()
            .unwrap();

        assert_eq!(stream.drain(), vec![RecorderEvent::Data(vec![7])]);
    }

    #[test]
    fn detached_sink_discards() {
        let sink = EventSink::detached();
        sink.emit_state(RecordState::Record);
        assert!(sink.is_closed());
    }
}
