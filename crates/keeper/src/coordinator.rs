// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public entry point: lifecycle, explicit refresh requests and session forks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::info;

use crate::classify::ErrorClassifier;
use crate::config::RefreshIntervals;
use crate::error::{RefreshError, RefreshOutcome};
use crate::issuer::Issuer;
use crate::operation::{OperationContext, RefreshRequest};
use crate::queue::OperationQueue;
use crate::serializer::RefreshSerializer;
use crate::session::{Session, SessionForker};
use crate::store::CertificateStore;
use crate::trigger::{PeriodicTrigger, Timer, TimerHandle};

/// Whether the coordinator accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Stopped,
    Running,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

/// Owns the queue, the trigger and the forker for one authenticated context.
pub struct RefreshCoordinator {
    ctx: Arc<OperationContext>,
    queue: OperationQueue,
    forker: SessionForker,
    trigger: PeriodicTrigger,
    /// Serialises `start`/`stop`; holds the armed schedule while running.
    control: Mutex<Option<TimerHandle>>,
    state_tx: watch::Sender<CoordinatorState>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        issuer: Arc<dyn Issuer>,
        classifier: ErrorClassifier,
        intervals: RefreshIntervals,
        timer: Arc<dyn Timer>,
    ) -> Self {
        let serializer = RefreshSerializer::new();
        let queue = OperationQueue::new();
        let forker = SessionForker::new(
            Arc::clone(&issuer),
            Arc::clone(&store),
            classifier.clone(),
            serializer.clone(),
            queue.clone(),
            intervals.wait_timeout,
        );
        let ctx = Arc::new(OperationContext { store, issuer, classifier, serializer, intervals });
        let (state_tx, _) = watch::channel(CoordinatorState::Stopped);
        Self {
            ctx,
            queue,
            forker,
            trigger: PeriodicTrigger::new(timer, intervals.check_interval),
            control: Mutex::new(None),
            state_tx,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_tx.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn CertificateStore> {
        &self.ctx.store
    }

    pub fn intervals(&self) -> RefreshIntervals {
        self.ctx.intervals
    }

    /// Open the queue and arm the periodic check. Idempotent.
    pub async fn start(&self) {
        let mut armed = self.control.lock().await;
        if armed.is_some() {
            return;
        }
        self.queue.open(Arc::clone(&self.ctx));
        *armed = Some(self.trigger.arm(self.queue.clone(), Arc::clone(&self.ctx.store)));
        self.state_tx.send_replace(CoordinatorState::Running);
        info!(
            check_interval_ms = self.ctx.intervals.check_interval.as_millis() as u64,
            "refresh coordinator started"
        );
    }

    /// Disarm the trigger and cancel all queued and running operations.
    ///
    /// Returns once every operation has delivered its outcome and the
    /// serializer is no longer held by the queue.
    pub async fn stop(&self) {
        let mut armed = self.control.lock().await;
        let Some(handle) = armed.take() else {
            return;
        };
        handle.cancel();
        self.queue.close().await;
        self.state_tx.send_replace(CoordinatorState::Stopped);
        info!("refresh coordinator stopped");
    }

    /// Enqueue a refresh and return a receiver for its outcome.
    pub fn enqueue(&self, request: RefreshRequest) -> oneshot::Receiver<RefreshOutcome> {
        self.queue.enqueue(request)
    }

    /// Enqueue a refresh and wait for its outcome.
    pub async fn request_refresh(&self, request: RefreshRequest) -> RefreshOutcome {
        match self.enqueue(request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshError::Cancelled),
        }
    }

    /// Start a forked API session and force a refresh. Rejected while stopped.
    pub async fn new_session(&self, session: Session) -> RefreshOutcome {
        if self.state() == CoordinatorState::Stopped {
            return Err(RefreshError::Cancelled);
        }
        self.forker.fork(&session).await
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
