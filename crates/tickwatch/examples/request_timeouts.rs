// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::too_many_lines)] // Example/test code

//! Reactor-style timeout wiring.
//!
//! Demonstrates:
//! - One group per timeout class (login, ping, per-request)
//! - A producer worker detecting expirations without mutating anything
//! - A consumer loop dispatching callbacks and cancelling timeouts when
//!   the awaited response arrives in time

use std::sync::Arc;
use std::time::{Duration, Instant};

use tickwatch::{ExpirySignal, TimeoutWorker, TimerManager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = TimerManager::new();

    // One group per class of timeout the session needs.
    let login_timeouts = manager.create_group(Duration::from_millis(250));
    let ping_timeouts = manager.create_group(Duration::from_millis(100));
    let request_timeouts = manager.create_group(Duration::from_millis(150));

    let login = login_timeouts.create_timer(|t| {
        println!("login timed out ({:?})", t.id());
    })?;
    let ping = ping_timeouts.create_timer(|t| {
        println!("ping timed out ({:?})", t.id());
    })?;
    login.start()?;
    ping.start()?;

    let mut requests = Vec::new();
    for n in 1..=3u32 {
        let timer = request_timeouts.create_timer(move |_| {
            println!("request {} timed out", n);
        })?;
        timer.start()?;
        requests.push(timer);
    }

    // Producer role: a background worker peeks and raises the signal.
    let signal = ExpirySignal::shared();
    let worker = TimeoutWorker::spawn(manager.clone(), Arc::clone(&signal))?;

    // Consumer role: this thread owns all mutation.
    let response_at = Instant::now() + Duration::from_millis(60);
    let shutdown_at = Instant::now() + Duration::from_millis(500);
    let mut response_seen = false;

    while Instant::now() < shutdown_at {
        if signal.wait_timeout(Duration::from_millis(20)) {
            let fired = manager.dispatch_expired();
            if fired > 0 {
                println!("dispatched {} expired timer(s)", fired);
            }
        }

        // The response for request 2 arrives well inside its deadline, so
        // its timeout is cancelled and never fires.
        if !response_seen && Instant::now() >= response_at {
            response_seen = true;
            if requests[1].stop() {
                println!("request 2 answered in time; timeout cancelled");
            }
        }
    }

    // Session teardown: deactivate and detach everything, firing nothing.
    let detached = manager.clear_all();
    worker.stop()?;

    let (started, stopped, polls, passes, fired, _, _, _) = manager.metrics().snapshot();
    println!(
        "teardown: {} timers detached; started={} stopped={} polls={} passes={} fired={}",
        detached, started, stopped, polls, passes, fired
    );
    Ok(())
}
