//! Render-ready signal
//!
//! A single-slot mailbox: a pending flag guarded by a mutex plus a condvar.
//! Any number of `signal()` calls before the consumer wakes collapse into one
//! wake-up; the consumer re-reads the whole buffer, so nothing is lost.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Coalescing "new data available" notification
pub struct RenderSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
    running: AtomicBool,
}

impl RenderSignal {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
            running: AtomicBool::new(true),
        }
    }

    /// Mark new data as available and wake one waiting consumer
    pub fn signal(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.condvar.notify_one();
    }

    /// Block until a signal is pending, then clear it.
    ///
    /// Returns immediately once [`shutdown`](Self::shutdown) has been called,
    /// so a consumer loop cannot park after termination.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while !*pending && self.is_running() {
            self.condvar.wait(&mut pending);
        }
        *pending = false;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` when a signal was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if !*pending && self.is_running() {
            self.condvar.wait_while_for(
                &mut pending,
                |pending| !*pending && self.running.load(Ordering::Acquire),
                timeout,
            );
        }
        std::mem::replace(&mut *pending, false)
    }

    /// Whether a signal is pending, without consuming it
    pub fn is_pending(&self) -> bool {
        *self.pending.lock()
    }

    /// Request termination and wake every waiting consumer
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let mut pending = self.pending.lock();
        *pending = true;
        self.condvar.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for RenderSignal {
    fn default() -> Self {
        Self::new()
    }
}
