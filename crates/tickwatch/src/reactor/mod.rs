// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reactor-side plumbing for the timeout subsystem.
//!
//! The scheduling model is a cooperative split across exactly two roles, not
//! a thread pool:
//!
//! * the **producer** role ([`TimeoutWorker`]) only ever calls the
//!   non-mutating [`TimerManager::detect_expired`] - it decides how long to
//!   sleep and raises an [`ExpirySignal`] when a deadline has elapsed;
//! * the **consumer** role (the reactor loop, owned by the embedding
//!   application) waits on the signal and is the only role that mutates:
//!   `start`, `stop` and [`TimerManager::dispatch_expired`].
//!
//! [`TimerManager::detect_expired`]: crate::timer::TimerManager::detect_expired
//! [`TimerManager::dispatch_expired`]: crate::timer::TimerManager::dispatch_expired

pub mod wake;
pub mod worker;

pub use self::wake::ExpirySignal;
pub use self::worker::{TimeoutWorker, DEFAULT_POLL_QUANTUM};
