// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-thread expiry notification with an atomic fast-path.
//!
//! The timeout worker raises the signal when it observes an elapsed
//! deadline; the dispatching thread consumes it between loop iterations.
//! Raising is a single atomic store unless the consumer is parked on the
//! condvar, so back-to-back raises while the consumer is busy cost almost
//! nothing.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One-bit "something is due" signal between the producer and consumer roles.
///
/// Sticky until consumed: repeated [`raise`](Self::raise) calls collapse into
/// one pending notification, which matches the protocol - the consumer
/// dispatches everything due in one pass regardless of how many deadlines
/// elapsed.
#[derive(Debug)]
pub struct ExpirySignal {
    /// Pending-notification flag, the lock-free fast path.
    due: AtomicBool,
    /// Whether the consumer is parked on the condvar.
    parked: Mutex<bool>,
    cv: Condvar,
}

impl ExpirySignal {
    pub fn new() -> Self {
        Self {
            due: AtomicBool::new(false),
            parked: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Create a signal already wrapped for sharing across threads.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Mark the signal pending and wake the consumer if it is parked.
    ///
    /// The parked check is racy but safe: the worst case is one spurious
    /// condvar signal.
    #[inline]
    pub fn raise(&self) {
        self.due.store(true, Ordering::Release);
        if *self.parked.lock() {
            self.cv.notify_one();
        }
    }

    /// Consume a pending notification. Returns whether one was pending.
    #[inline]
    pub fn take(&self) -> bool {
        self.due.swap(false, Ordering::Acquire)
    }

    /// Peek without consuming.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.due.load(Ordering::Acquire)
    }

    /// Park until the signal is raised or `timeout` elapses, consuming the
    /// notification. Returns `true` iff a notification was consumed.
    ///
    /// Returns immediately when a notification is already pending.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.take() {
            return true;
        }

        let mut parked = self.parked.lock();
        // Re-check under the lock: a raise may have slipped in between the
        // fast-path check and the lock acquisition.
        if self.take() {
            return true;
        }

        *parked = true;
        let _ = self.cv.wait_for(&mut parked, timeout);
        *parked = false;

        self.take()
    }
}

impl Default for ExpirySignal {
    fn default() -> Self {
        Self::new()
    }
}
