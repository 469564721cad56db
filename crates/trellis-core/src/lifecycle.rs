//! Process lifecycle signaling.
//!
//! Components that care about process state subscribe to an injected
//! [`LifecycleEvents`] instead of registering with ambient globals.
//! Two signals are carried: "stopped" gates new upgrade handshakes,
//! "closing" tells listeners to shut down.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Shared lifecycle state, one per process (or per test).
#[derive(Debug)]
pub struct LifecycleEvents {
    stopped: AtomicBool,
    closing: watch::Sender<bool>,
}

impl LifecycleEvents {
    pub fn new() -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            stopped: AtomicBool::new(false),
            closing,
        }
    }

    /// True once the service has been stopped; new upgrades are refused.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Gate new upgrades without closing existing listeners.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Stop the service and broadcast the closing signal. Idempotent;
    /// safe with no subscribers.
    pub fn shutdown(&self) {
        self.stop();
        self.closing.send_replace(true);
    }

    /// Subscribe to the closing signal.
    pub fn subscribe_closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let events = LifecycleEvents::new();
        assert!(!events.is_stopped());
    }

    #[test]
    fn stop_gates_without_closing() {
        let events = LifecycleEvents::new();
        let rx = events.subscribe_closing();
        events.stop();
        assert!(events.is_stopped());
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_broadcasts_closing_and_is_idempotent() {
        let events = LifecycleEvents::new();
        let mut rx = events.subscribe_closing();

        events.shutdown();
        events.shutdown();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(events.is_stopped());
    }

    #[test]
    fn shutdown_without_subscribers_does_not_panic() {
        let events = LifecycleEvents::new();
        events.shutdown();
        assert!(events.is_stopped());
    }
}
