// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Producer-role worker thread for the timeout subsystem.
//!
//! The worker loops over the non-mutating [`TimerManager::detect_expired`]:
//! when a deadline has already elapsed it raises the [`ExpirySignal`] so the
//! dispatching thread wakes up, otherwise it sleeps for the minimum of the
//! polling quantum and the distance to the next deadline. It never fires
//! timer logic itself.
//!
//! [`TimerManager::detect_expired`]: crate::timer::TimerManager::detect_expired

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::reactor::wake::ExpirySignal;
use crate::timer::TimerManager;

/// Default polling quantum: upper bound on how long the worker sleeps when no
/// deadline is close.
pub const DEFAULT_POLL_QUANTUM: Duration = Duration::from_millis(10);

/// Floor on worker naps so an imminent deadline cannot degrade the loop into
/// a busy spin.
const MIN_NAP: Duration = Duration::from_micros(200);

/// Handle to the running timeout worker thread.
///
/// When dropped, signals the thread to stop and joins it.
pub struct TimeoutWorker {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutWorker {
    /// Spawn a worker polling `manager` with [`DEFAULT_POLL_QUANTUM`].
    pub fn spawn(manager: TimerManager, signal: Arc<ExpirySignal>) -> io::Result<Self> {
        Self::spawn_with_quantum(manager, signal, DEFAULT_POLL_QUANTUM)
    }

    /// Spawn a worker with an explicit polling quantum.
    ///
    /// The quantum bounds both the detection latency when new timers are
    /// started behind the worker's back and the shutdown latency of
    /// [`stop`](Self::stop).
    pub fn spawn_with_quantum(
        manager: TimerManager,
        signal: Arc<ExpirySignal>,
        quantum: Duration,
    ) -> io::Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("tickwatch-timeout".to_string())
            .spawn(move || worker_loop(&manager, &signal, &stop, quantum))?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    /// Stop the worker and join its thread.
    pub fn stop(mut self) -> io::Result<()> {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| io::Error::other("timeout worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for TimeoutWorker {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    manager: &TimerManager,
    signal: &ExpirySignal,
    stop: &AtomicBool,
    quantum: Duration,
) {
    log::debug!("[TIMEOUT-WORKER] started quantum={:?}", quantum);

    while !stop.load(Ordering::Acquire) {
        let poll = manager.detect_expired();
        if poll.expired {
            // Something is due: wake the dispatching thread, then back off a
            // full quantum. Dispatch is the consumer's job; re-raising next
            // round is harmless if it has not caught up yet.
            signal.raise();
            thread::sleep(quantum);
        } else {
            thread::sleep(poll.sleep_budget(quantum).max(MIN_NAP));
        }
    }

    log::debug!("[TIMEOUT-WORKER] stopped");
}
