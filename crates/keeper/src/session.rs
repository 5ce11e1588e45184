// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start a new API session from a forked selector, then force a refresh.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::classify::ErrorClassifier;
use crate::error::{RefreshError, RefreshOutcome};
use crate::issuer::Issuer;
use crate::operation::RefreshRequest;
use crate::queue::OperationQueue;
use crate::serializer::RefreshSerializer;
use crate::store::CertificateStore;

/// Forked session handed over by the host application.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub selector: String,
    /// Cookie to present alongside the selector, if the fork requires one.
    #[serde(default)]
    pub cookie: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("selector", &self.selector)
            .field("cookie", &self.cookie.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Exchanges a session selector for an API session under the serializer.
pub struct SessionForker {
    issuer: Arc<dyn Issuer>,
    store: Arc<dyn CertificateStore>,
    classifier: ErrorClassifier,
    serializer: RefreshSerializer,
    queue: OperationQueue,
    wait_timeout: Duration,
}

impl SessionForker {
    pub fn new(
        issuer: Arc<dyn Issuer>,
        store: Arc<dyn CertificateStore>,
        classifier: ErrorClassifier,
        serializer: RefreshSerializer,
        queue: OperationQueue,
        wait_timeout: Duration,
    ) -> Self {
        Self { issuer, store, classifier, serializer, queue, wait_timeout }
    }

    /// Start the session, then enqueue a forced refresh and wait for it.
    ///
    /// The serializer is released before the refresh is enqueued, so the
    /// forced operation can take it in turn.
    pub async fn fork(&self, session: &Session) -> RefreshOutcome {
        let token = match self.serializer.acquire(self.wait_timeout).await {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    wait_ms = self.wait_timeout.as_millis() as u64,
                    "timed out waiting for serializer before starting session"
                );
                return Err(e);
            }
        };

        let started = self.issuer.start_session(session).await;
        self.serializer.release(token);

        if let Err(e) = started {
            let classified = self.classifier.classify(&e);
            warn!(err = %e, outcome = classified.as_str(), "failed to start forked session");
            return Err(classified);
        }
        info!("forked session started, forcing certificate refresh");

        let request = RefreshRequest::forced(self.store.stored_features());
        match self.queue.enqueue(request).await {
            Ok(outcome) => outcome,
            // Worker dropped the reply without answering; only happens on shutdown.
            Err(_) => Err(RefreshError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
