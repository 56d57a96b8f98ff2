//! "Space available" signal between an audio backend and the feeder thread
//!
//! Behaves like an auto-reset event: `notify()` latches the signal,
//! and the next wait consumes it. Notifications that arrive while nobody
//! is waiting are not lost, and several notifications collapse into one.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SpaceSignal {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl SpaceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the signal and wake the waiter, if any
    pub fn notify(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.cond.notify_one();
    }

    /// Block until the signal is latched, then reset it
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            signaled = self
                .cond
                .wait(signaled)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *signaled = false;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`
    ///
    /// # Returns
    /// `true` if the signal was consumed, `false` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut signaled, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        let was_signaled = *signaled;
        *signaled = false;
        was_signaled
    }
}
