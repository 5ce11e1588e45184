// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic background staleness checks.
//!
//! The trigger never refreshes by itself; each tick enqueues a non-forced
//! background request and the queued operation decides whether anything is due.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::operation::RefreshRequest;
use crate::queue::{OperationQueue, Reply};
use crate::store::CertificateStore;

/// Shortest period a schedule runs at; zero is clamped up to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Callback invoked on every tick.
pub type TickFn = Box<dyn Fn() + Send + Sync>;

/// Repeating timer source.
pub trait Timer: Send + Sync {
    /// Call `on_tick` at `first_fire_at` and then every `every` until the
    /// returned handle is cancelled or dropped.
    fn schedule(&self, first_fire_at: Instant, every: Duration, on_tick: TickFn) -> TimerHandle;
}

/// Live schedule. Dropping it stops further ticks.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// [`Timer`] backed by a tokio interval task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, first_fire_at: Instant, every: Duration, on_tick: TickFn) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(first_fire_at, every.max(MIN_PERIOD));
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tick.tick() => on_tick(),
                }
            }
        });
        TimerHandle::new(cancel)
    }
}

/// Arms a [`Timer`] that feeds background checks into the queue.
pub struct PeriodicTrigger {
    timer: Arc<dyn Timer>,
    every: Duration,
}

impl PeriodicTrigger {
    pub fn new(timer: Arc<dyn Timer>, every: Duration) -> Self {
        if every < MIN_PERIOD {
            warn!(every_ms = every.as_millis() as u64, "check interval too short, clamping");
        }
        Self { timer, every: every.max(MIN_PERIOD) }
    }

    /// Start ticking, first tick immediately. Each tick checks against the
    /// features recorded with the current certificate.
    pub fn arm(&self, queue: OperationQueue, store: Arc<dyn CertificateStore>) -> TimerHandle {
        debug!(every_ms = self.every.as_millis() as u64, "arming periodic refresh check");
        let on_tick: TickFn = Box::new(move || {
            debug!("periodic refresh check");
            queue.submit(RefreshRequest::background(store.stored_features()), Reply::Log);
        });
        self.timer.schedule(Instant::now(), self.every, on_tick)
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
