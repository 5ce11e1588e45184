// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote certificate issuer.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use crate::classify::RemoteError;
use crate::features::ConnectionFeatures;
use crate::session::Session;
use crate::store::StoredCertificate;

pub use http::HttpIssuer;

/// Boxed future returned by [`Issuer`] methods.
pub type IssuerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Issuing service the coordinator renews certificates against.
///
/// Object-safe for use as `Arc<dyn Issuer>`. Completion may happen on any
/// runtime worker.
pub trait Issuer: Send + Sync + 'static {
    /// Request a new certificate for `public_key` with `features` embedded.
    fn refresh_certificate<'a>(
        &'a self,
        public_key: &'a [u8],
        features: Option<&'a ConnectionFeatures>,
    ) -> IssuerFuture<'a, StoredCertificate>;

    /// Start a new API session from a forked session selector.
    fn start_session<'a>(&'a self, session: &'a Session) -> IssuerFuture<'a, ()>;
}
