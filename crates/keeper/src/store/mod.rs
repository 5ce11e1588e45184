// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certificate, key pair, and feature persistence.
//!
//! The coordinator only sees the [`CertificateStore`] capability. Certificate
//! and features always travel together through [`CertificateStore::store`] so
//! a reader never observes a certificate paired with another request's
//! features.

pub mod file;
pub mod memory;

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::features::ConnectionFeatures;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A short-lived certificate as issued by the remote service.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    /// Opaque certificate bytes.
    pub certificate: Vec<u8>,
    /// Instant after which the certificate is no longer accepted.
    pub valid_until: SystemTime,
    /// Instant after which renewal should be attempted.
    pub refresh_time: SystemTime,
}

impl fmt::Debug for StoredCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCertificate")
            .field("len", &self.certificate.len())
            .field("valid_until", &self.valid_until)
            .field("refresh_time", &self.refresh_time)
            .finish()
    }
}

/// Key pair the certificate is requested for. Never generated here.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredKeyPair {
    /// DER-encoded public key.
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_key_len", &self.public_key.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Persistence capability consumed by the refresh core.
pub trait CertificateStore: Send + Sync {
    fn stored_certificate(&self) -> Option<StoredCertificate>;

    fn stored_key_pair(&self) -> Option<StoredKeyPair>;

    fn stored_features(&self) -> Option<ConnectionFeatures>;

    /// Replace certificate and features as one unit.
    fn store(
        &self,
        certificate: StoredCertificate,
        features: Option<ConnectionFeatures>,
    ) -> anyhow::Result<()>;

    fn store_key_pair(&self, keys: StoredKeyPair) -> anyhow::Result<()>;

    /// Delete the key pair. The certificate is useless without it and goes too.
    fn delete_keys(&self);

    fn delete_certificate(&self);
}

/// Milliseconds since the Unix epoch.
pub fn to_epoch_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

pub fn from_epoch_ms(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}
