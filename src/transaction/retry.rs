//! One-shot retry timer
//!
//! Tokio-task rendition of a restartable single-shot timer. The pump
//! arms it after a failed delivery; on expiry the callback schedules
//! another pump run. `restart` replaces any pending shot, so arming is
//! idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct RetryTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
    armed: Arc<AtomicBool>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Arm the timer, cancelling any pending shot first.
    pub fn restart<F>(&self, delay: Duration, on_expiry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        self.armed.store(true, Ordering::SeqCst);
        let armed = Arc::clone(&self.armed);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            armed.store(false, Ordering::SeqCst);
            on_expiry();
        }));
    }

    /// Whether a shot is pending.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Cancel any pending shot.
    pub fn stop(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Default for RetryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
