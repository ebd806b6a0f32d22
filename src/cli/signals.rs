//! Signal handling for interactive capture
//!
//! Ctrl-C and SIGTERM end the session; on Unix, SIGUSR1 toggles pause.

use tokio::sync::mpsc;

/// Control request raised by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop and keep what was recorded
    Shutdown,
    /// Pause when recording, resume when paused
    TogglePause,
}

/// Receiver for OS control signals
pub struct ControlSignals {
    receiver: mpsc::Receiver<ControlSignal>,
}

impl ControlSignals {
    /// Install the handlers. Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn listen() -> Result<Self, std::io::Error> {
        use tokio::signal::unix::{signal, SignalKind};

        let (tx, receiver) = mpsc::channel(8);
        for (kind, control) in [
            (SignalKind::interrupt(), ControlSignal::Shutdown),
            (SignalKind::terminate(), ControlSignal::Shutdown),
            (SignalKind::user_defined1(), ControlSignal::TogglePause),
        ] {
            let mut stream = signal(kind)?;
            let tx = tx.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(control).await.is_err() {
                        break;
                    }
                }
            });
        }
        Ok(Self { receiver })
    }

    #[cfg(not(unix))]
    pub fn listen() -> Result<Self, std::io::Error> {
        let (tx, receiver) = mpsc::channel(8);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(ControlSignal::Shutdown).await.is_err() {
                    break;
                }
            }
        });
        Ok(Self { receiver })
    }

    /// Signals fed from a channel instead of the OS
    pub fn from_channel(receiver: mpsc::Receiver<ControlSignal>) -> Self {
        Self { receiver }
    }

    /// Wait for the next signal
    pub async fn recv(&mut self) -> Option<ControlSignal> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_signals_arrive_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut signals = ControlSignals::from_channel(rx);

        tx.send(ControlSignal::TogglePause).await.unwrap();
        tx.send(ControlSignal::Shutdown).await.unwrap();
        drop(tx);

        assert_eq!(signals.recv().await, Some(ControlSignal::TogglePause));
        assert_eq!(signals.recv().await, Some(ControlSignal::Shutdown));
        assert_eq!(signals.recv().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listen_installs_handlers() {
        assert!(ControlSignals::listen().is_ok());
    }
}
