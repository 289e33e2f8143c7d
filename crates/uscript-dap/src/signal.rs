//! One-shot synchronization signals.
//!
//! A [`Signal`] carries a single "it happened" bit between the event
//! dispatcher (which fires it) and a request handler parked on `wait`. The
//! bit is sticky until `reset`: waiters must reset after waking and before
//! re-arming, or a stale fire from a previous probe satisfies the next wait
//! immediately.

use std::pin::pin;
use std::sync::Mutex;

use tokio::sync::Notify;

#[derive(Default)]
pub struct Signal {
    fired: Mutex<bool>,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the signal fires. Returns immediately when it already has.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking the flag so a fire in between is not
            // missed.
            notified.as_mut().enable();
            if *self.fired.lock().unwrap_or_else(|e| e.into_inner()) {
                return;
            }
            notified.await;
        }
    }

    pub fn fire(&self) {
        *self.fired.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.notify.notify_waiters();
    }

    pub fn reset(&self) {
        *self.fired.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.lock().unwrap_or_else(|e| e.into_inner())
    }
}
