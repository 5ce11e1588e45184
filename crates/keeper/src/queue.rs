// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO lane of refresh operations, run one at a time.
//!
//! The lane exists only while the coordinator is running. Closing it cancels
//! everything still waiting and resolves each with [`RefreshError::Cancelled`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RefreshError, RefreshOutcome};
use crate::operation::{OperationContext, RefreshOperation, RefreshRequest};

/// Where an operation's outcome goes.
#[derive(Debug)]
pub enum Reply {
    /// Hand the outcome back to a waiting caller.
    Caller(oneshot::Sender<RefreshOutcome>),
    /// Nobody is waiting; log the outcome.
    Log,
}

impl Reply {
    fn deliver(self, outcome: RefreshOutcome) {
        match self {
            Self::Caller(tx) => {
                // Receiver gone means the caller stopped caring.
                let _ = tx.send(outcome);
            }
            Self::Log => match outcome {
                Ok(()) => debug!("background refresh finished"),
                Err(RefreshError::Cancelled) => debug!("background refresh cancelled"),
                Err(e) => warn!(err = %e, code = e.as_str(), "background refresh failed"),
            },
        }
    }
}

struct Queued {
    request: RefreshRequest,
    reply: Reply,
}

struct Lane {
    tx: mpsc::UnboundedSender<Queued>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Cloneable handle to the operation lane.
#[derive(Clone, Default)]
pub struct OperationQueue {
    lane: Arc<Mutex<Option<Lane>>>,
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue").field("open", &self.is_open()).finish()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.lane.lock().is_some()
    }

    /// Open the lane and spawn its worker. No-op if already open.
    pub fn open(&self, ctx: Arc<OperationContext>) {
        let mut lane = self.lane.lock();
        if lane.is_some() {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_lane(ctx, rx, cancel.clone()));
        *lane = Some(Lane { tx, cancel, worker });
        debug!("operation queue opened");
    }

    /// Cancel pending and running operations, then wait for the worker to drain.
    pub async fn close(&self) {
        let lane = self.lane.lock().take();
        let Some(lane) = lane else {
            return;
        };
        lane.cancel.cancel();
        drop(lane.tx);
        if let Err(e) = lane.worker.await {
            warn!(err = %e, "operation queue worker ended abnormally");
        }
        debug!("operation queue closed");
    }

    /// Append a request. Rejected with `Cancelled` if the lane is closed.
    pub fn submit(&self, request: RefreshRequest, reply: Reply) {
        let rejected = {
            let lane = self.lane.lock();
            match lane.as_ref() {
                Some(lane) => lane
                    .tx
                    .send(Queued { request, reply })
                    .err()
                    .map(|mpsc::error::SendError(queued)| queued.reply),
                None => Some(reply),
            }
        };
        if let Some(reply) = rejected {
            debug!("refresh request rejected, queue closed");
            reply.deliver(Err(RefreshError::Cancelled));
        }
    }

    /// Append a request and return a receiver for its outcome.
    pub fn enqueue(&self, request: RefreshRequest) -> oneshot::Receiver<RefreshOutcome> {
        let (tx, rx) = oneshot::channel();
        self.submit(request, Reply::Caller(tx));
        rx
    }
}

async fn run_lane(
    ctx: Arc<OperationContext>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    cancel: CancellationToken,
) {
    while let Some(Queued { request, reply }) = rx.recv().await {
        // Each operation gets its own child token so closing the lane reaches
        // whichever one is current as well as those still queued.
        let op = RefreshOperation::new(Arc::clone(&ctx), request, cancel.child_token());
        let id = op.id();
        debug!(op = %id, request = ?op.request(), "operation started");
        let outcome = op.run().await;
        debug!(op = %id, ok = outcome.is_ok(), "operation finished");
        reply.deliver(outcome);
    }
    info!("operation queue drained");
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
