// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON file store under the state directory.
//!
//! - `keys.json` - key pair (base64)
//! - `certificate.json` - certificate and the features it was issued for
//!
//! Writes go to a `.tmp` sibling and are renamed into place, so a crash
//! mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::features::ConnectionFeatures;
use crate::store::{
    from_epoch_ms, to_epoch_ms, CertificateStore, StoredCertificate, StoredKeyPair,
};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedKeys {
    public_key: String,
    private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCertificate {
    certificate: String,
    valid_until_ms: u64,
    refresh_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<ConnectionFeatures>,
}

/// [`CertificateStore`] backed by JSON documents in a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    /// Serializes writers; readers go straight to disk.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, write_lock: Mutex::new(()) }
    }

    fn keys_path(&self) -> PathBuf {
        self.dir.join("keys.json")
    }

    fn certificate_path(&self) -> PathBuf {
        self.dir.join("certificate.json")
    }

    fn read_certificate_doc(&self) -> Option<PersistedCertificate> {
        let path = self.certificate_path();
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %path.display(), "no stored certificate: {e}");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(path = %path.display(), "failed to parse stored certificate: {e}");
                None
            }
        }
    }

    fn remove(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to delete: {e}"),
        }
    }
}

/// Write `contents` to `path` via a temp file and rename.
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl CertificateStore for FileStore {
    fn stored_certificate(&self) -> Option<StoredCertificate> {
        let doc = self.read_certificate_doc()?;
        let certificate = match BASE64.decode(doc.certificate.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("stored certificate is not valid base64: {e}");
                return None;
            }
        };
        Some(StoredCertificate {
            certificate,
            valid_until: from_epoch_ms(doc.valid_until_ms),
            refresh_time: from_epoch_ms(doc.refresh_time_ms),
        })
    }

    fn stored_key_pair(&self) -> Option<StoredKeyPair> {
        let path = self.keys_path();
        let data = std::fs::read_to_string(&path).ok()?;

        let decoded = serde_json::from_str::<PersistedKeys>(&data)
            .map_err(anyhow::Error::from)
            .and_then(|keys| {
                Ok(StoredKeyPair {
                    public_key: BASE64.decode(keys.public_key.as_bytes())?,
                    private_key: BASE64.decode(keys.private_key.as_bytes())?,
                })
            });

        match decoded {
            Ok(keys) => Some(keys),
            Err(e) => {
                // Broken keys make the certificate unusable as well.
                warn!(
                    path = %path.display(),
                    "stored keys unreadable, deleting keys and certificate: {e}"
                );
                self.delete_keys();
                None
            }
        }
    }

    fn stored_features(&self) -> Option<ConnectionFeatures> {
        self.read_certificate_doc()?.features
    }

    fn store(
        &self,
        certificate: StoredCertificate,
        features: Option<ConnectionFeatures>,
    ) -> anyhow::Result<()> {
        let doc = PersistedCertificate {
            certificate: BASE64.encode(&certificate.certificate),
            valid_until_ms: to_epoch_ms(certificate.valid_until),
            refresh_time_ms: to_epoch_ms(certificate.refresh_time),
            features,
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let _guard = self.write_lock.lock();
        write_atomic(&self.certificate_path(), &json)?;
        debug!(features = ?doc.features, "stored certificate with features");
        Ok(())
    }

    fn store_key_pair(&self, keys: StoredKeyPair) -> anyhow::Result<()> {
        let doc = PersistedKeys {
            public_key: BASE64.encode(&keys.public_key),
            private_key: BASE64.encode(&keys.private_key),
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let _guard = self.write_lock.lock();
        write_atomic(&self.keys_path(), &json)
    }

    fn delete_keys(&self) {
        info!("deleting stored key pair");
        {
            let _guard = self.write_lock.lock();
            self.remove(&self.keys_path());
        }
        self.delete_certificate();
    }

    fn delete_certificate(&self) {
        info!("deleting stored certificate");
        let _guard = self.write_lock.lock();
        self.remove(&self.certificate_path());
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
