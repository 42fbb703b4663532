use std::time::Duration;
use tokio::sync::watch;

/// Held by `main`; firing it (or dropping it) stops every task.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Cloned into each long-lived task.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown is requested.
    pub async fn triggered(&mut self) {
        // Err means the trigger is gone, which also ends the run
        let _ = self.0.wait_for(|stop| *stop).await;
    }

    /// Sleeps for `d`; returns true if shutdown interrupted the sleep.
    pub async fn sleep(&mut self, d: Duration) -> bool {
        tokio::select! {
            _ = self.triggered() => true,
            _ = tokio::time::sleep(d) => false,
        }
    }
}
