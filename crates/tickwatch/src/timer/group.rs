// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-delay timer groups.
//!
//! A group is a delay template plus a membership index, not a shared
//! deadline: many unrelated timers (one per channel, one per outstanding
//! request) attach to a single group to reuse its delay configuration, and
//! each member still gets its own deadline computed at its own `start` call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::timer::manager::{GroupId, Shared};
use crate::timer::{Result, Timer, TimerCallback};

/// A bucket of timers sharing one fixed delay.
///
/// Created only through [`TimerManager::create_group`]; the delay is
/// immutable for the group's lifetime. Cloning yields another handle to the
/// same group. Detection and dispatch happen at manager level over the union
/// of all groups - the group itself only carries configuration and
/// membership.
///
/// [`TimerManager::create_group`]: crate::timer::TimerManager::create_group
#[derive(Clone)]
pub struct TimerGroup {
    shared: Arc<Shared>,
    id: GroupId,
    delay: Duration,
}

impl TimerGroup {
    pub(crate) fn from_parts(shared: Arc<Shared>, id: GroupId, delay: Duration) -> Self {
        Self { shared, id, delay }
    }

    /// The fixed delay applied to every member timer at `start`.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Identifier of this group within its manager.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Create a new Stopped timer owned by this group.
    ///
    /// The callback runs when the timer expires and a dispatch pass picks it
    /// up, or when [`Timer::invoke_callback`] is called while the timer is
    /// Active.
    ///
    /// # Errors
    ///
    /// [`TimerError::GroupCleared`] if the group has been cleared from the
    /// manager.
    ///
    /// [`TimerError::GroupCleared`]: crate::timer::TimerError::GroupCleared
    pub fn create_timer(
        &self,
        callback: impl Fn(&Timer) + Send + Sync + 'static,
    ) -> Result<Timer> {
        let callback: Arc<TimerCallback> = Arc::new(callback);
        let id = self.shared.create_timer(self.id, callback)?;
        Ok(Timer::from_parts(Arc::clone(&self.shared), self.id, id))
    }
}

impl fmt::Debug for TimerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGroup")
            .field("id", &self.id)
            .field("delay", &self.delay)
            .finish()
    }
}
