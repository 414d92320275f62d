// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timer aggregation and the detect/dispatch protocol.
//!
//! [`TimerManager`] owns every timer group and answers the two reactor-side
//! questions:
//!
//! * [`detect_expired`](TimerManager::detect_expired) - "is anything due, and
//!   when is the next deadline?" A pure read, safe for a producer thread to
//!   call concurrently with consumer mutations.
//! * [`dispatch_expired`](TimerManager::dispatch_expired) - "fire everything
//!   due right now." Mutating, intended for exactly one consumer thread.
//!
//! All membership and deadline state sits behind a single mutex. Callbacks
//! are invoked with the lock released, so a callback may start or stop timers
//! on the same manager without deadlocking.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::timer::group::TimerGroup;
use crate::timer::{Result, Timer, TimerCallback, TimerError};

// ============================================================================
// Metrics
// ============================================================================

/// Counters tracking timer lifecycle and dispatch outcomes.
///
/// All fields use relaxed atomics which is sufficient because consumers only
/// need monotonic snapshots for observability.
#[derive(Debug)]
pub struct TimerMetrics {
    /// Successful `start` transitions (Stopped -> Active).
    pub timers_started: AtomicU64,
    /// `stop` calls that actually deactivated an Active timer.
    pub timers_stopped: AtomicU64,
    /// Non-mutating detect polls served.
    pub detect_polls: AtomicU64,
    /// Dispatch passes run (including passes with nothing due).
    pub dispatch_passes: AtomicU64,
    /// Callbacks invoked, via dispatch or direct invocation.
    pub callbacks_fired: AtomicU64,
    /// Callbacks that panicked during a dispatch pass.
    pub callbacks_panicked: AtomicU64,
    /// Groups created through the manager factory.
    pub groups_created: AtomicU64,
    /// Groups removed via `clear_group` / `clear_all`.
    pub groups_cleared: AtomicU64,
}

impl TimerMetrics {
    /// Create a zeroed metrics struct ready for concurrent updates.
    #[inline]
    pub fn new() -> Self {
        Self {
            timers_started: AtomicU64::new(0),
            timers_stopped: AtomicU64::new(0),
            detect_polls: AtomicU64::new(0),
            dispatch_passes: AtomicU64::new(0),
            callbacks_fired: AtomicU64::new(0),
            callbacks_panicked: AtomicU64::new(0),
            groups_created: AtomicU64::new(0),
            groups_cleared: AtomicU64::new(0),
        }
    }

    /// Return the current counters without synchronisation penalties.
    ///
    /// Order: `(started, stopped, polls, passes, fired, panicked,
    /// groups_created, groups_cleared)`.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64, u64, u64, u64) {
        (
            self.timers_started.load(Ordering::Relaxed),
            self.timers_stopped.load(Ordering::Relaxed),
            self.detect_polls.load(Ordering::Relaxed),
            self.dispatch_passes.load(Ordering::Relaxed),
            self.callbacks_fired.load(Ordering::Relaxed),
            self.callbacks_panicked.load(Ordering::Relaxed),
            self.groups_created.load(Ordering::Relaxed),
            self.groups_cleared.load(Ordering::Relaxed),
        )
    }
}

impl Default for TimerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a timer group within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(u64);

/// Opaque identifier of a timer within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

// ============================================================================
// Registry (single lock)
// ============================================================================

struct TimerEntry {
    /// `Some` iff the timer is Active. This field IS the state machine:
    /// the "deadline defined iff Active" invariant cannot be violated.
    deadline: Option<Instant>,
    callback: Arc<TimerCallback>,
}

struct GroupEntry {
    delay: Duration,
    timers: HashMap<u64, TimerEntry>,
}

#[derive(Default)]
struct Registry {
    groups: HashMap<u64, GroupEntry>,
    next_group: u64,
    next_timer: u64,
}

/// A timer pulled out of the registry by a dispatch pass.
///
/// Its deadline has already been cleared (Stopped) under the lock; the
/// callback fires afterwards with the lock released.
struct DueTimer {
    group: GroupId,
    id: TimerId,
    deadline: Instant,
    callback: Arc<TimerCallback>,
}

/// Shared state behind every manager, group and timer handle.
pub(crate) struct Shared {
    registry: Mutex<Registry>,
    metrics: TimerMetrics,
}

impl Shared {
    fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            metrics: TimerMetrics::new(),
        }
    }

    pub(crate) fn metrics(&self) -> &TimerMetrics {
        &self.metrics
    }

    fn create_group(&self, delay: Duration) -> GroupId {
        let id = {
            let mut reg = self.registry.lock();
            let id = reg.next_group;
            reg.next_group += 1;
            reg.groups.insert(
                id,
                GroupEntry {
                    delay,
                    timers: HashMap::new(),
                },
            );
            id
        };
        self.metrics.groups_created.fetch_add(1, Ordering::Relaxed);
        log::debug!("[TIMER] group {:?} created delay={:?}", GroupId(id), delay);
        GroupId(id)
    }

    pub(crate) fn create_timer(
        &self,
        group: GroupId,
        callback: Arc<TimerCallback>,
    ) -> Result<TimerId> {
        let mut reg = self.registry.lock();
        let id = reg.next_timer;
        let entry = reg
            .groups
            .get_mut(&group.0)
            .ok_or(TimerError::GroupCleared)?;
        entry.timers.insert(
            id,
            TimerEntry {
                deadline: None,
                callback,
            },
        );
        reg.next_timer += 1;
        Ok(TimerId(id))
    }

    pub(crate) fn start_timer(&self, group: GroupId, timer: TimerId) -> Result<Instant> {
        let (deadline, delay) = {
            let mut reg = self.registry.lock();
            let g = reg
                .groups
                .get_mut(&group.0)
                .ok_or(TimerError::GroupCleared)?;
            let delay = g.delay;
            let t = g
                .timers
                .get_mut(&timer.0)
                .ok_or(TimerError::GroupCleared)?;
            if t.deadline.is_some() {
                return Err(TimerError::AlreadyActive);
            }
            let deadline = Instant::now() + delay;
            t.deadline = Some(deadline);
            (deadline, delay)
        };
        self.metrics.timers_started.fetch_add(1, Ordering::Relaxed);
        log::debug!("[TIMER] start {:?}/{:?} fires_in={:?}", group, timer, delay);
        Ok(deadline)
    }

    pub(crate) fn stop_timer(&self, group: GroupId, timer: TimerId) -> bool {
        let was_active = {
            let mut reg = self.registry.lock();
            match reg
                .groups
                .get_mut(&group.0)
                .and_then(|g| g.timers.get_mut(&timer.0))
            {
                Some(t) => t.deadline.take().is_some(),
                None => false,
            }
        };
        if was_active {
            self.metrics.timers_stopped.fetch_add(1, Ordering::Relaxed);
            log::debug!("[TIMER] stop {:?}/{:?}", group, timer);
        }
        was_active
    }

    /// Transition Active -> Stopped and hand back the callback, or `None`
    /// when the timer is Stopped or its group is gone.
    pub(crate) fn take_active_callback(
        &self,
        group: GroupId,
        timer: TimerId,
    ) -> Option<Arc<TimerCallback>> {
        let mut reg = self.registry.lock();
        let t = reg.groups.get_mut(&group.0)?.timers.get_mut(&timer.0)?;
        if t.deadline.take().is_some() {
            Some(Arc::clone(&t.callback))
        } else {
            None
        }
    }

    pub(crate) fn timer_deadline(&self, group: GroupId, timer: TimerId) -> Option<Instant> {
        let reg = self.registry.lock();
        reg.groups
            .get(&group.0)
            .and_then(|g| g.timers.get(&timer.0))
            .and_then(|t| t.deadline)
    }

    fn detect(&self, now: Instant) -> TimerPoll {
        let next_deadline = {
            let reg = self.registry.lock();
            reg.groups
                .values()
                .flat_map(|g| g.timers.values())
                .filter_map(|t| t.deadline)
                .min()
        };
        self.metrics.detect_polls.fetch_add(1, Ordering::Relaxed);
        TimerPoll {
            expired: next_deadline.is_some_and(|d| d <= now),
            next_deadline,
        }
    }

    /// Pull every expired timer out of the Active set in one locked pass.
    ///
    /// Each returned timer is already Stopped; ordering is ascending deadline
    /// across all groups.
    fn collect_due(&self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();
        {
            let mut reg = self.registry.lock();
            for (gid, g) in reg.groups.iter_mut() {
                for (tid, t) in g.timers.iter_mut() {
                    match t.deadline {
                        Some(deadline) if deadline <= now => {
                            t.deadline = None;
                            due.push(DueTimer {
                                group: GroupId(*gid),
                                id: TimerId(*tid),
                                deadline,
                                callback: Arc::clone(&t.callback),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        due.sort_by_key(|d| d.deadline);
        due
    }

    fn clear_group(&self, group: GroupId) -> usize {
        let detached = {
            let mut reg = self.registry.lock();
            match reg.groups.remove(&group.0) {
                Some(g) => g.timers.len(),
                None => return 0,
            }
        };
        self.metrics.groups_cleared.fetch_add(1, Ordering::Relaxed);
        log::debug!("[TIMER] group {:?} cleared, {} timers detached", group, detached);
        detached
    }

    fn clear_all(&self) -> usize {
        let (groups, detached) = {
            let mut reg = self.registry.lock();
            let groups = reg.groups.len();
            let detached = reg.groups.values().map(|g| g.timers.len()).sum();
            reg.groups.clear();
            (groups, detached)
        };
        self.metrics
            .groups_cleared
            .fetch_add(groups as u64, Ordering::Relaxed);
        if groups > 0 {
            log::debug!(
                "[TIMER] manager cleared, {} groups / {} timers detached",
                groups,
                detached
            );
        }
        detached
    }
}

// ============================================================================
// Detect result
// ============================================================================

/// Snapshot returned by [`TimerManager::detect_expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPoll {
    /// At least one Active timer's deadline has already passed.
    pub expired: bool,
    /// Earliest deadline over all Active timers, `None` when nothing is
    /// pending.
    pub next_deadline: Option<Instant>,
}

impl TimerPoll {
    /// How long a polling thread may sleep before the next deadline could
    /// elapse, capped at `quantum`.
    ///
    /// Returns `quantum` when no timer is pending and zero when a deadline
    /// has already passed.
    #[must_use]
    pub fn sleep_budget(&self, quantum: Duration) -> Duration {
        match self.next_deadline {
            Some(deadline) => quantum.min(deadline.saturating_duration_since(Instant::now())),
            None => quantum,
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Aggregates all timer groups and exposes the detect/dispatch protocol.
///
/// Construct one manager per reactor session, share clones of the handle
/// between the producer and consumer threads, and tear it down with
/// [`clear_all`](TimerManager::clear_all) at session end. The manager is an
/// explicit owned value, never a process-wide singleton.
#[derive(Clone)]
pub struct TimerManager {
    shared: Arc<Shared>,
}

impl TimerManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
        }
    }

    /// Create a new group with the given fixed delay and register it.
    pub fn create_group(&self, delay: Duration) -> TimerGroup {
        let id = self.shared.create_group(delay);
        TimerGroup::from_parts(Arc::clone(&self.shared), id, delay)
    }

    /// Non-mutating peek: is anything expired, and when is the next deadline?
    ///
    /// Never deactivates, removes or fires a timer, even when something is
    /// already due - the reported pair stays identical across repeated calls
    /// until a `start`/`stop`/dispatch actually changes the Active set. Safe
    /// to call from a producer thread concurrently with consumer mutations.
    #[must_use]
    pub fn detect_expired(&self) -> TimerPoll {
        self.shared.detect(Instant::now())
    }

    /// Fire the callback of every Active timer whose deadline has passed,
    /// exactly once each, leaving those timers Stopped.
    ///
    /// Returns the number of timers dispatched; calling with nothing due is a
    /// no-op returning 0 and leaves pending deadlines untouched. Callbacks
    /// run in ascending deadline order with the manager lock released.
    ///
    /// Intended for exactly one logical consumer thread at a time; safe to
    /// run concurrently with [`detect_expired`](Self::detect_expired) calls
    /// from another thread.
    ///
    /// # Panics
    ///
    /// A panicking callback does not disturb the rest of the pass: every
    /// other due timer still fires and all bookkeeping completes. The first
    /// captured panic is then resumed so the consumer's own error policy sees
    /// it.
    pub fn dispatch_expired(&self) -> usize {
        self.shared
            .metrics
            .dispatch_passes
            .fetch_add(1, Ordering::Relaxed);

        let due = self.shared.collect_due(Instant::now());
        if due.is_empty() {
            return 0;
        }

        let fired = due.len();
        let mut first_panic = None;
        for d in due {
            let timer = Timer::from_parts(Arc::clone(&self.shared), d.group, d.id);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (d.callback)(&timer)));
            self.shared
                .metrics
                .callbacks_fired
                .fetch_add(1, Ordering::Relaxed);
            if let Err(payload) = outcome {
                self.shared
                    .metrics
                    .callbacks_panicked
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("[TIMER] callback panicked {:?}/{:?}", d.group, d.id);
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }

        log::debug!("[TIMER] dispatch pass fired {} timers", fired);
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        fired
    }

    /// Stop (without firing) and detach every member of `group`, then remove
    /// the group from the manager.
    ///
    /// This is teardown, not expiration: callbacks are never invoked. Returns
    /// the number of detached timers; clearing an already-cleared group
    /// returns 0. Subsequent `start` calls on detached timers fail with
    /// [`TimerError::GroupCleared`].
    pub fn clear_group(&self, group: &TimerGroup) -> usize {
        self.shared.clear_group(group.id())
    }

    /// Clear every group: session teardown.
    ///
    /// Returns the total number of detached timers.
    pub fn clear_all(&self) -> usize {
        self.shared.clear_all()
    }

    /// Lifecycle and dispatch counters for this manager.
    pub fn metrics(&self) -> &TimerMetrics {
        self.shared.metrics()
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerState;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counting_timer(group: &TimerGroup) -> (Timer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let timer = group
            .create_timer(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("create_timer");
        (timer, count)
    }

    #[test]
    fn test_single_timer_full_lifecycle() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(50));
        let (timer, count) = counting_timer(&group);

        timer.start().expect("start");
        assert_eq!(timer.state(), TimerState::Active);

        // Deadline lands within (now, now + delay].
        let poll = manager.detect_expired();
        assert!(!poll.expired, "freshly started timer must not be due");
        let next = poll.next_deadline.expect("next deadline");
        assert!(next > Instant::now());
        assert!(next <= Instant::now() + Duration::from_millis(50));

        thread::sleep(Duration::from_millis(80));
        let poll = manager.detect_expired();
        assert!(poll.expired, "deadline has elapsed");
        assert_eq!(poll.next_deadline, Some(next), "peek must not disturb the deadline");

        assert_eq!(manager.dispatch_expired(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), TimerState::Stopped);

        // Nothing left pending anywhere.
        let poll = manager.detect_expired();
        assert_eq!(
            poll,
            TimerPoll {
                expired: false,
                next_deadline: None
            }
        );
    }

    #[test]
    fn test_detect_is_stable_until_dispatch() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(30));
        let (timer, count) = counting_timer(&group);
        timer.start().expect("start");

        thread::sleep(Duration::from_millis(50));

        let first = manager.detect_expired();
        let second = manager.detect_expired();
        let third = manager.detect_expired();
        assert!(first.expired);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(count.load(Ordering::SeqCst), 0, "peeking must never fire");

        assert_eq!(manager.dispatch_expired(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(manager.detect_expired().next_deadline.is_none());
    }

    #[test]
    fn test_dispatch_noop_when_nothing_due() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(500));
        let (timer, count) = counting_timer(&group);
        timer.start().expect("start");

        let before = timer.deadline();
        assert_eq!(manager.dispatch_expired(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timer.deadline(), before, "pending deadline left untouched");
        assert!(timer.is_active());
    }

    #[test]
    fn test_two_groups_simultaneous_expiry() {
        let manager = TimerManager::new();
        let group_a = manager.create_group(Duration::from_millis(40));
        let group_b = manager.create_group(Duration::from_millis(40));
        let (timer_a, count_a) = counting_timer(&group_a);
        let (timer_b, count_b) = counting_timer(&group_b);

        timer_a.start().expect("start a");
        timer_b.start().expect("start b");

        let poll = manager.detect_expired();
        assert!(!poll.expired);
        assert!(poll.next_deadline.is_some());

        thread::sleep(Duration::from_millis(60));
        assert!(manager.detect_expired().expired);
        assert_eq!(manager.dispatch_expired(), 2);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);

        // Second pass finds nothing: exactly-once.
        assert_eq!(manager.dispatch_expired(), 0);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_two_groups_staggered_expiry() {
        let manager = TimerManager::new();
        let fast = manager.create_group(Duration::from_millis(40));
        let slow = manager.create_group(Duration::from_millis(400));
        let (fast_timer, fast_count) = counting_timer(&fast);
        let (slow_timer, slow_count) = counting_timer(&slow);

        fast_timer.start().expect("start fast");
        slow_timer.start().expect("start slow");
        let fast_deadline = fast_timer.deadline().expect("fast deadline");

        thread::sleep(Duration::from_millis(60));

        assert!(manager.detect_expired().expired);
        assert_eq!(manager.dispatch_expired(), 1, "only the fast timer is due");
        assert_eq!(fast_count.load(Ordering::SeqCst), 1);
        assert_eq!(slow_count.load(Ordering::SeqCst), 0);
        assert!(slow_timer.is_active());

        // Aggregate hands over to the remaining (future) deadline.
        let poll = manager.detect_expired();
        assert!(!poll.expired);
        let next = poll.next_deadline.expect("slow deadline pending");
        assert!(next > fast_deadline);
        assert_eq!(Some(next), slow_timer.deadline());
    }

    #[test]
    fn test_stop_suppresses_callback() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(40));
        let (timer, count) = counting_timer(&group);

        timer.start().expect("start");
        assert!(timer.stop());
        assert!(timer.deadline().is_none());

        // Even a direct invocation must not fire a stopped timer.
        timer.invoke_callback();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Stop is idempotent-safe.
        assert!(!timer.stop());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(manager.dispatch_expired(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invoke_callback_fires_active_timer_once() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_secs(60));
        let (timer, count) = counting_timer(&group);

        timer.start().expect("start");
        timer.invoke_callback();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), TimerState::Stopped);

        // Second invocation is a no-op.
        timer.invoke_callback();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_start_fails_fast() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_secs(60));
        let (timer, _count) = counting_timer(&group);

        timer.start().expect("start");
        let deadline = timer.deadline();
        assert_eq!(timer.start(), Err(TimerError::AlreadyActive));
        assert_eq!(timer.deadline(), deadline, "deadline must not silently reset");
    }

    #[test]
    fn test_restart_after_stop_resets_deadline() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(200));
        let (timer, _count) = counting_timer(&group);

        timer.start().expect("start");
        let first = timer.deadline().expect("deadline");
        thread::sleep(Duration::from_millis(20));

        assert!(timer.stop());
        timer.start().expect("restart");
        let second = timer.deadline().expect("deadline");
        assert!(second > first);
    }

    #[test]
    fn test_clear_group_detaches_without_firing() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(20));
        let (active, active_count) = counting_timer(&group);
        let (idle, idle_count) = counting_timer(&group);

        active.start().expect("start");
        assert_eq!(manager.clear_group(&group), 2);

        // Teardown, not expiration: no callbacks, nothing pending.
        assert_eq!(active_count.load(Ordering::SeqCst), 0);
        assert_eq!(idle_count.load(Ordering::SeqCst), 0);
        assert!(manager.detect_expired().next_deadline.is_none());

        // Detached timers fail fast on start, no-op on stop/invoke.
        assert_eq!(active.start(), Err(TimerError::GroupCleared));
        assert!(!active.stop());
        idle.invoke_callback();
        assert_eq!(idle_count.load(Ordering::SeqCst), 0);

        // The group itself is gone.
        assert_eq!(manager.clear_group(&group), 0);
        assert_eq!(
            group.create_timer(|_| {}).err(),
            Some(TimerError::GroupCleared)
        );
    }

    #[test]
    fn test_clear_all_tears_down_every_group() {
        let manager = TimerManager::new();
        let ping = manager.create_group(Duration::from_millis(30));
        let login = manager.create_group(Duration::from_millis(60));
        let (t1, c1) = counting_timer(&ping);
        let (t2, c2) = counting_timer(&login);

        t1.start().expect("start");
        t2.start().expect("start");
        assert_eq!(manager.clear_all(), 2);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(manager.dispatch_expired(), 0);
        assert_eq!(c1.load(Ordering::SeqCst), 0);
        assert_eq!(c2.load(Ordering::SeqCst), 0);
        assert_eq!(manager.detect_expired().next_deadline, None);
    }

    #[test]
    fn test_dispatch_order_is_ascending_deadline() {
        let manager = TimerManager::new();
        let fast = manager.create_group(Duration::from_millis(10));
        let slow = manager.create_group(Duration::from_millis(30));

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let o1 = Arc::clone(&order);
        let o2 = Arc::clone(&order);
        let fast_timer = fast
            .create_timer(move |_| o1.lock().push("fast"))
            .expect("create_timer");
        let slow_timer = slow
            .create_timer(move |_| o2.lock().push("slow"))
            .expect("create_timer");

        // Start the later-expiring timer first to rule out insertion order.
        slow_timer.start().expect("start slow");
        fast_timer.start().expect("start fast");

        thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.dispatch_expired(), 2);
        assert_eq!(*order.lock(), vec!["fast", "slow"]);
    }

    #[test]
    fn test_callback_may_restart_its_own_timer() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(30));

        // Periodic-style callback: re-arm from inside the dispatch pass.
        let timer = group
            .create_timer(|t| {
                t.start().expect("re-arm inside callback");
            })
            .expect("create_timer");
        timer.start().expect("start");

        thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.dispatch_expired(), 1);

        // The callback ran and re-armed the timer for another period.
        assert!(timer.is_active());
        let poll = manager.detect_expired();
        assert!(!poll.expired);
        assert!(poll.next_deadline.is_some());
    }

    #[test]
    fn test_dispatch_isolates_callback_panic() {
        let manager = TimerManager::new();
        let fast = manager.create_group(Duration::from_millis(10));
        let slow = manager.create_group(Duration::from_millis(30));

        let bad = fast
            .create_timer(|_| panic!("callback failure"))
            .expect("create_timer");
        let (good, good_count) = counting_timer(&slow);

        bad.start().expect("start bad");
        good.start().expect("start good");
        thread::sleep(Duration::from_millis(50));

        // The panicking callback dispatches first (earlier deadline); the
        // pass must still fire the other timer before resuming the panic.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| manager.dispatch_expired()));
        assert!(outcome.is_err(), "panic is propagated to the consumer");
        assert_eq!(good_count.load(Ordering::SeqCst), 1);
        assert_eq!(bad.state(), TimerState::Stopped);
        assert_eq!(good.state(), TimerState::Stopped);
        assert_eq!(manager.detect_expired().next_deadline, None);

        let (_, _, _, _, fired, panicked, _, _) = manager.metrics().snapshot();
        assert_eq!(fired, 2);
        assert_eq!(panicked, 1);
    }

    #[test]
    fn test_metrics_track_lifecycle() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(20));
        let (timer, _count) = counting_timer(&group);

        timer.start().expect("start");
        timer.stop();
        timer.start().expect("restart");
        thread::sleep(Duration::from_millis(40));
        manager.detect_expired();
        manager.dispatch_expired();
        manager.clear_group(&group);

        let (started, stopped, polls, passes, fired, panicked, created, cleared) =
            manager.metrics().snapshot();
        assert_eq!(started, 2);
        assert_eq!(stopped, 1);
        assert_eq!(polls, 1);
        assert_eq!(passes, 1);
        assert_eq!(fired, 1);
        assert_eq!(panicked, 0);
        assert_eq!(created, 1);
        assert_eq!(cleared, 1);
    }

    #[test]
    fn test_sleep_budget() {
        let quantum = Duration::from_millis(10);

        let idle = TimerPoll {
            expired: false,
            next_deadline: None,
        };
        assert_eq!(idle.sleep_budget(quantum), quantum);

        let distant = TimerPoll {
            expired: false,
            next_deadline: Some(Instant::now() + Duration::from_secs(60)),
        };
        assert_eq!(distant.sleep_budget(quantum), quantum);

        let overdue = TimerPoll {
            expired: true,
            next_deadline: Some(Instant::now() - Duration::from_millis(5)),
        };
        assert_eq!(overdue.sleep_budget(quantum), Duration::ZERO);

        let close = TimerPoll {
            expired: false,
            next_deadline: Some(Instant::now() + Duration::from_millis(2)),
        };
        assert!(close.sleep_budget(quantum) <= Duration::from_millis(2));
    }
}
