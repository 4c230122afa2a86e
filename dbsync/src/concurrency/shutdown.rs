//! Broadcast shutdown signal for a run.
//!
//! A single [`ShutdownTx`] is owned by whoever decides that the run must stop (the binary's
//! Ctrl+C handler, the coordinator's deadline). Every stage holds a [`ShutdownRx`] and checks it
//! between units of work. Once fired the signal stays fired.

use tokio::sync::watch;

/// Sending side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Fires the signal. Calling it again has no further effect.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Returns a new receiver observing this signal.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Receiving side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once the signal has fired.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until the signal fires.
    ///
    /// Resolves immediately if it already has. If every sender is dropped without firing, this
    /// never resolves.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel in the not-fired state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
