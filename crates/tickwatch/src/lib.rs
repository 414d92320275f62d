// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Tickwatch - Timeout timers for real-time market-data reactors
//!
//! Manages groups of fixed-delay timeout timers (login timeouts, ping
//! timeouts, per-request timeouts) for a reactor/event loop. The design
//! splits work across exactly two roles: a producer thread that *peeks* at
//! the timer state to decide how long it may sleep, and a single consumer
//! thread that *mutates* - starting, stopping and firing timers.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tickwatch::{TimerManager, Result};
//!
//! fn main() -> Result<()> {
//!     let manager = TimerManager::new();
//!     let ping = manager.create_group(Duration::from_millis(100));
//!
//!     let timer = ping.create_timer(|t| {
//!         println!("ping timed out (timer {:?})", t.id());
//!     })?;
//!     timer.start()?;
//!
//!     // Producer side: is anything due, and how long may we sleep?
//!     let poll = manager.detect_expired();
//!     assert!(!poll.expired);
//!
//!     // Consumer side: fire everything due right now (nothing yet).
//!     assert_eq!(manager.dispatch_expired(), 0);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  producer ("worker") thread                consumer ("reactor") thread
//!  --------------------------                ---------------------------
//!  detect_expired() --- peek --> +--------------+ <-- mutate --- start/stop
//!  sleep(min(quantum, next-now)) | TimerManager |                dispatch_expired()
//!  raise ExpirySignal ---------> | group/timer  |                  -> callbacks
//!                                | registry     |                     fire once
//!                                +--------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TimerManager`] | Owns all groups; exposes the detect/dispatch protocol |
//! | [`TimerGroup`] | Fixed-delay bucket that timers attach to |
//! | [`Timer`] | A single schedulable deadline with a callback |
//! | [`TimeoutWorker`] | Producer-role background thread (peek + signal) |
//! | [`ExpirySignal`] | Cross-thread wake primitive between the two roles |

/// Reactor-side plumbing: the producer worker thread and the wake signal.
pub mod reactor;
/// Timer primitives: timers, groups, the manager and its metrics.
pub mod timer;

pub use reactor::{ExpirySignal, TimeoutWorker, DEFAULT_POLL_QUANTUM};
pub use timer::{
    GroupId, Result, Timer, TimerCallback, TimerError, TimerGroup, TimerId, TimerManager,
    TimerMetrics, TimerPoll, TimerState,
};
