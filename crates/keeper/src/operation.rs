// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One cancellable refresh attempt.
//!
//! ```text
//! Created ──▶ Cancelled
//!    │
//!    ▼
//! AwaitingLock ──▶ Cancelled | TimedOut
//!    │
//!    ▼
//! Running ──▶ Finished
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::ErrorClassifier;
use crate::config::RefreshIntervals;
use crate::error::{RefreshError, RefreshOutcome};
use crate::features::ConnectionFeatures;
use crate::issuer::Issuer;
use crate::serializer::RefreshSerializer;
use crate::staleness::{self, Staleness};
use crate::store::CertificateStore;

/// Parameters of a refresh request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Features to embed. `None` keeps whatever the issuer defaults to.
    pub features: Option<ConnectionFeatures>,
    pub user_initiated: bool,
    /// Skip the staleness check and always call the issuer.
    pub forced: bool,
}

impl RefreshRequest {
    /// Periodic, non-forced check.
    pub fn background(features: Option<ConnectionFeatures>) -> Self {
        Self { features, user_initiated: false, forced: false }
    }

    pub fn user(features: Option<ConnectionFeatures>) -> Self {
        Self { features, user_initiated: true, forced: false }
    }

    /// Unconditional refresh after a new API session was started.
    pub fn forced(features: Option<ConnectionFeatures>) -> Self {
        Self { features, user_initiated: false, forced: true }
    }
}

/// Lifecycle of a [`RefreshOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Created,
    AwaitingLock,
    Running,
    Cancelled,
    TimedOut,
    Finished,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut | Self::Finished)
    }
}

/// Collaborators shared by every operation of one coordinator.
pub struct OperationContext {
    pub store: Arc<dyn CertificateStore>,
    pub issuer: Arc<dyn Issuer>,
    pub classifier: ErrorClassifier,
    pub serializer: RefreshSerializer,
    pub intervals: RefreshIntervals,
}

/// A single refresh attempt. Consumed by [`run`](Self::run), so it yields
/// exactly one outcome.
pub struct RefreshOperation {
    id: Uuid,
    ctx: Arc<OperationContext>,
    request: RefreshRequest,
    cancel: CancellationToken,
    state_tx: watch::Sender<OperationState>,
}

impl std::fmt::Debug for RefreshOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOperation")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl RefreshOperation {
    pub fn new(
        ctx: Arc<OperationContext>,
        request: RefreshRequest,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(OperationState::Created);
        Self { id: Uuid::new_v4(), ctx, request, cancel, state_tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &RefreshRequest {
        &self.request
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.state_tx.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: OperationState) {
        self.state_tx.send_replace(state);
    }

    /// Run the attempt to completion.
    pub async fn run(self) -> RefreshOutcome {
        let outcome = self.execute().await;
        let terminal = match &outcome {
            Err(RefreshError::Cancelled) => OperationState::Cancelled,
            Err(RefreshError::TimedOut) => OperationState::TimedOut,
            _ => OperationState::Finished,
        };
        self.set_state(terminal);
        outcome
    }

    async fn execute(&self) -> RefreshOutcome {
        let op = self.id;
        if self.cancel.is_cancelled() {
            debug!(%op, "cancelled before start");
            return Err(RefreshError::Cancelled);
        }

        self.set_state(OperationState::AwaitingLock);
        let wait_timeout = self.ctx.intervals.wait_timeout;
        let token = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(%op, "cancelled while waiting for serializer");
                return Err(RefreshError::Cancelled);
            }
            result = self.ctx.serializer.acquire(wait_timeout) => match result {
                Ok(token) => token,
                Err(e) => {
                    warn!(
                        %op,
                        wait_ms = wait_timeout.as_millis() as u64,
                        "timed out waiting for serializer"
                    );
                    return Err(e);
                }
            },
        };

        // Cancellation may have landed while we were queued on the lock.
        if self.cancel.is_cancelled() {
            self.ctx.serializer.release(token);
            debug!(%op, "cancelled after acquiring serializer");
            return Err(RefreshError::Cancelled);
        }

        self.set_state(OperationState::Running);
        let outcome = self.refresh_locked().await;
        self.ctx.serializer.release(token);
        outcome
    }

    /// Body of the attempt; caller holds the serializer.
    async fn refresh_locked(&self) -> RefreshOutcome {
        let op = self.id;
        let store = &self.ctx.store;
        let request = &self.request;

        if request.forced {
            info!(%op, "forced refresh, skipping staleness check");
        } else {
            let verdict = staleness::evaluate(
                store.stored_certificate().as_ref(),
                store.stored_features().as_ref(),
                request.features.as_ref(),
                SystemTime::now(),
                self.ctx.intervals.refresh_earlier_by,
            );
            match verdict {
                Staleness::Fresh { refresh_in } => {
                    info!(%op, refresh_in_secs = refresh_in.as_secs(), "certificate up to date");
                    return Ok(());
                }
                reason => {
                    info!(
                        %op,
                        ?reason,
                        user_initiated = request.user_initiated,
                        "refreshing certificate"
                    );
                }
            }
        }

        let Some(keys) = store.stored_key_pair() else {
            warn!(%op, "no stored key pair, keys must be regenerated");
            return Err(RefreshError::NeedNewKeys);
        };

        match self.ctx.issuer.refresh_certificate(&keys.public_key, request.features.as_ref()).await
        {
            Ok(certificate) => {
                let refresh_time = certificate.refresh_time;
                if let Err(e) = store.store(certificate, request.features.clone()) {
                    warn!(%op, err = %e, "failed to store refreshed certificate");
                    return Err(RefreshError::Unclassified(format!(
                        "failed to store certificate: {e:#}"
                    )));
                }
                let refresh_in = refresh_time.duration_since(SystemTime::now()).unwrap_or_default();
                info!(%op, refresh_in_secs = refresh_in.as_secs(), "certificate refreshed");
                Ok(())
            }
            Err(e) => {
                let classified = self.ctx.classifier.classify(&e);
                warn!(%op, err = %e, outcome = classified.as_str(), "certificate refresh failed");
                Err(classified)
            }
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
