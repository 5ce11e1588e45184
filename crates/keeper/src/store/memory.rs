// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store, used by embedders that persist elsewhere and by tests.

use parking_lot::Mutex;

use crate::features::ConnectionFeatures;
use crate::store::{CertificateStore, StoredCertificate, StoredKeyPair};

#[derive(Debug, Default)]
struct Slots {
    keys: Option<StoredKeyPair>,
    certificate: Option<StoredCertificate>,
    features: Option<ConnectionFeatures>,
}

/// [`CertificateStore`] holding everything behind one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<Slots>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a key pair.
    pub fn with_keys(keys: StoredKeyPair) -> Self {
        Self { slots: Mutex::new(Slots { keys: Some(keys), ..Slots::default() }) }
    }
}

impl CertificateStore for MemoryStore {
    fn stored_certificate(&self) -> Option<StoredCertificate> {
        self.slots.lock().certificate.clone()
    }

    fn stored_key_pair(&self) -> Option<StoredKeyPair> {
        self.slots.lock().keys.clone()
    }

    fn stored_features(&self) -> Option<ConnectionFeatures> {
        self.slots.lock().features.clone()
    }

    fn store(
        &self,
        certificate: StoredCertificate,
        features: Option<ConnectionFeatures>,
    ) -> anyhow::Result<()> {
        let mut slots = self.slots.lock();
        slots.certificate = Some(certificate);
        slots.features = features;
        Ok(())
    }

    fn store_key_pair(&self, keys: StoredKeyPair) -> anyhow::Result<()> {
        self.slots.lock().keys = Some(keys);
        Ok(())
    }

    fn delete_keys(&self) {
        let mut slots = self.slots.lock();
        slots.keys = None;
        slots.certificate = None;
        slots.features = None;
    }

    fn delete_certificate(&self) {
        let mut slots = self.slots.lock();
        slots.certificate = None;
        slots.features = None;
    }
}
