// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timeout timer primitives.
//!
//! A [`Timer`] is a single schedulable deadline with an associated callback,
//! owned by exactly one [`TimerGroup`] for its lifetime. Groups are created
//! through the [`TimerManager`] factory and share one fixed delay; the
//! manager aggregates all groups and exposes the detect/dispatch protocol
//! (see [`manager`]).
//!
//! State machine per timer:
//!
//! ```text
//! Stopped --start--> Active --{stop | expire+dispatch | invoke_callback}--> Stopped
//! ```
//!
//! No other transitions exist. `start` on an Active timer is a contract
//! violation and returns [`TimerError::AlreadyActive`] without touching the
//! deadline; callers reset a timer by stopping and starting it again.

pub mod group;
pub mod manager;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use self::manager::Shared;

pub use self::group::TimerGroup;
pub use self::manager::{GroupId, TimerId, TimerManager, TimerMetrics, TimerPoll};

/// Callback invoked when a timer fires.
///
/// Receives the timer itself for introspection. Callbacks are always invoked
/// with the manager lock released, so they may start or stop timers on the
/// same manager.
pub type TimerCallback = dyn Fn(&Timer) + Send + Sync;

/// Scheduling state of a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Not scheduled; no deadline is set and the callback cannot fire.
    Stopped,
    /// Scheduled; the deadline is set and the callback fires once it elapses.
    Active,
}

/// Errors from timer contract violations.
///
/// No-op conditions (stopping a stopped timer, dispatching with nothing due,
/// invoking a stopped timer's callback) are not errors and never surface here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// `start` was called on a timer that is already Active.
    AlreadyActive,
    /// The timer's owning group has been cleared from the manager.
    GroupCleared,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "timer is already active; stop it before restarting"),
            Self::GroupCleared => write!(f, "timer group has been cleared from the manager"),
        }
    }
}

impl std::error::Error for TimerError {}

/// Result type for timer operations.
pub type Result<T> = std::result::Result<T, TimerError>;

/// A single schedulable deadline with an associated callback.
///
/// Created Stopped through [`TimerGroup::create_timer`]; the creator owns the
/// handle. The timer stays registered with its group until the group is
/// cleared, so dropping the handle does not cancel a pending deadline - call
/// [`Timer::stop`] for that.
pub struct Timer {
    shared: Arc<Shared>,
    group: GroupId,
    id: TimerId,
}

impl Timer {
    pub(crate) fn from_parts(shared: Arc<Shared>, group: GroupId, id: TimerId) -> Self {
        Self { shared, group, id }
    }

    /// Schedule the timer: the deadline becomes `now + group delay`.
    ///
    /// # Errors
    ///
    /// * [`TimerError::AlreadyActive`] - the timer is already scheduled. The
    ///   existing deadline is left untouched; stop first to reset it.
    /// * [`TimerError::GroupCleared`] - the owning group was cleared.
    pub fn start(&self) -> Result<()> {
        self.shared.start_timer(self.group, self.id)?;
        Ok(())
    }

    /// Deschedule the timer without firing its callback.
    ///
    /// Safe in any state; returns whether the timer was Active. After the
    /// owning group has been cleared this is a harmless no-op.
    pub fn stop(&self) -> bool {
        self.shared.stop_timer(self.group, self.id)
    }

    /// Fire the callback now if the timer is Active, exactly once, then leave
    /// it Stopped.
    ///
    /// Mirrors what a dispatch pass does for an individually expired timer.
    /// On a Stopped timer this is a no-op: a stopped timer's callback can
    /// never fire, even through a retained handle.
    pub fn invoke_callback(&self) {
        if let Some(callback) = self.shared.take_active_callback(self.group, self.id) {
            self.shared
                .metrics()
                .callbacks_fired
                .fetch_add(1, Ordering::Relaxed);
            callback(self);
        }
    }

    /// Deadline of the timer, `Some` iff Active.
    ///
    /// Callers deciding whether a timer has expired must go through
    /// [`TimerManager::detect_expired`]; this accessor is for introspection.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.timer_deadline(self.group, self.id)
    }

    /// Current scheduling state.
    pub fn state(&self) -> TimerState {
        if self.deadline().is_some() {
            TimerState::Active
        } else {
            TimerState::Stopped
        }
    }

    /// `true` iff the timer is Active.
    pub fn is_active(&self) -> bool {
        self.deadline().is_some()
    }

    /// Identifier of this timer within its manager.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Identifier of the owning group.
    pub fn group_id(&self) -> GroupId {
        self.group
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("group", &self.group)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timer_created_stopped() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(100));
        let timer = group.create_timer(|_| {}).expect("create_timer");

        assert_eq!(timer.state(), TimerState::Stopped);
        assert!(!timer.is_active());
        assert!(timer.deadline().is_none());
    }

    #[test]
    fn test_error_display() {
        assert!(TimerError::AlreadyActive.to_string().contains("active"));
        assert!(TimerError::GroupCleared.to_string().contains("cleared"));
    }

    #[test]
    fn test_timer_ids_are_distinct() {
        let manager = TimerManager::new();
        let group = manager.create_group(Duration::from_millis(100));
        let a = group.create_timer(|_| {}).expect("create_timer");
        let b = group.create_timer(|_| {}).expect("create_timer");

        assert_ne!(a.id(), b.id());
        assert_eq!(a.group_id(), b.group_id());
    }
}
