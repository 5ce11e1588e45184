// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive right to talk to the issuer.
//!
//! Queued operations, the session forker, and any direct caller all go through
//! the same serializer, so at most one issuer call is in flight regardless of
//! where it came from.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::RefreshError;

/// Single-permit lock with bounded acquisition.
#[derive(Debug, Clone)]
pub struct RefreshSerializer {
    permit: Arc<Semaphore>,
}

/// Proof of exclusive access. Released on [`RefreshSerializer::release`] or drop.
#[derive(Debug)]
#[must_use = "dropping the token releases the serializer"]
pub struct SerializerToken {
    _permit: OwnedSemaphorePermit,
}

impl Default for RefreshSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSerializer {
    pub fn new() -> Self {
        Self { permit: Arc::new(Semaphore::new(1)) }
    }

    /// Wait at most `timeout` for the token.
    pub async fn acquire(&self, timeout: Duration) -> Result<SerializerToken, RefreshError> {
        match tokio::time::timeout(timeout, Arc::clone(&self.permit).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(SerializerToken { _permit: permit }),
            // The semaphore is never closed; treat it like a cancellation if it is.
            Ok(Err(_)) => Err(RefreshError::Cancelled),
            Err(_) => Err(RefreshError::TimedOut),
        }
    }

    /// Take the token only if it is free right now.
    pub fn try_acquire(&self) -> Option<SerializerToken> {
        Arc::clone(&self.permit)
            .try_acquire_owned()
            .ok()
            .map(|permit| SerializerToken { _permit: permit })
    }

    pub fn release(&self, token: SerializerToken) {
        drop(token);
    }

    /// Whether some caller currently holds the token.
    pub fn is_held(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

#[cfg(test)]
#[path = "serializer_tests.rs"]
mod tests;
