// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote failure classification.
//!
//! The issuer reports failures as an HTTP status plus an optional numeric
//! code. Which code means what is owned by the issuer, so the mapping lives
//! in an injected [`ClassificationTable`]; the built-in catalogue is only a
//! default.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{PolicyViolation, RefreshError, SystemErrorKind};

/// Failure reported by the issuer or the transport in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, when the request reached the issuer.
    pub status: Option<u16>,
    /// Issuer-specific numeric code from the response body.
    pub code: Option<i64>,
    pub message: String,
    /// `Retry-After` hint.
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn api(status: u16, code: Option<i64>, message: impl Into<String>) -> Self {
        Self { status: Some(status), code, message: message.into(), retry_after: None }
    }

    /// Failure before any response was received (DNS, connect, TLS, decode).
    pub fn transport(message: impl Into<String>) -> Self {
        Self { status: None, code: None, message: message.into(), retry_after: None }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code) {
            (Some(status), Some(code)) => write!(f, "{status} (code {code}): {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Semantic kind a remote code or status maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErrorKind {
    CertificateExpired,
    CertificateRevoked,
    SessionExpiredOrMissing,
    NeedNewKeys,
    TooManyRequests,
    PolicyViolation(PolicyViolation),
    SystemError(SystemErrorKind),
}

impl ErrorKind {
    /// Build the outcome, carrying `retry_after` for rate limiting.
    pub fn to_error(self, retry_after: Option<Duration>) -> RefreshError {
        match self {
            Self::CertificateExpired => RefreshError::CertificateExpired,
            Self::CertificateRevoked => RefreshError::CertificateRevoked,
            Self::SessionExpiredOrMissing => RefreshError::SessionExpiredOrMissing,
            Self::NeedNewKeys => RefreshError::NeedNewKeys,
            Self::TooManyRequests => RefreshError::TooManyRequests { retry_after },
            Self::PolicyViolation(v) => RefreshError::PolicyViolation(v),
            Self::SystemError(kind) => RefreshError::SystemError(kind),
        }
    }
}

/// Parse a snake_case unit variant through its serde representation.
fn parse_tag<T: serde::de::DeserializeOwned>(tag: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(tag.to_owned())).ok()
}

fn tag_of<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.split_once(':') {
            Some(("policy_violation", v)) => parse_tag(v).map(Self::PolicyViolation),
            Some(("system_error", v)) => parse_tag(v).map(Self::SystemError),
            Some(_) => None,
            None => match s {
                "certificate_expired" => Some(Self::CertificateExpired),
                "certificate_revoked" => Some(Self::CertificateRevoked),
                "session_expired" => Some(Self::SessionExpiredOrMissing),
                "need_new_keys" => Some(Self::NeedNewKeys),
                "too_many_requests" => Some(Self::TooManyRequests),
                _ => None,
            },
        };
        kind.ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

impl TryFrom<String> for ErrorKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CertificateExpired => "certificate_expired".to_owned(),
            ErrorKind::CertificateRevoked => "certificate_revoked".to_owned(),
            ErrorKind::SessionExpiredOrMissing => "session_expired".to_owned(),
            ErrorKind::NeedNewKeys => "need_new_keys".to_owned(),
            ErrorKind::TooManyRequests => "too_many_requests".to_owned(),
            ErrorKind::PolicyViolation(v) => format!("policy_violation:{}", tag_of(&v)),
            ErrorKind::SystemError(k) => format!("system_error:{}", tag_of(&k)),
        }
    }
}

/// Code and status lookup tables. Codes take precedence over statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTable {
    #[serde(default)]
    pub codes: HashMap<i64, ErrorKind>,
    #[serde(default)]
    pub statuses: HashMap<u16, ErrorKind>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        use ErrorKind as K;
        use PolicyViolation as P;
        use SystemErrorKind as S;

        let codes = HashMap::from([
            (10013, K::SessionExpiredOrMissing),
            (86101, K::CertificateExpired),
            (86102, K::CertificateRevoked),
            (86103, K::NeedNewKeys), // key used multiple times
            (86104, K::SystemError(S::ServerError)),
            (86105, K::SystemError(S::BadCertificateSignature)),
            (86106, K::SystemError(S::CertificateNotProvided)),
            (86110, K::PolicyViolation(P::MaxSessionsUnknown)),
            (86111, K::PolicyViolation(P::MaxSessionsFree)),
            (86112, K::PolicyViolation(P::MaxSessionsBasic)),
            (86113, K::PolicyViolation(P::MaxSessionsPlus)),
            (86114, K::PolicyViolation(P::MaxSessionsVisionary)),
            (86115, K::PolicyViolation(P::MaxSessionsPro)),
            (86151, K::PolicyViolation(P::RestrictedServer)),
            (86152, K::PolicyViolation(P::LowPlan)),
            (86153, K::PolicyViolation(P::Delinquent)),
            (86154, K::PolicyViolation(P::TorrentNotAllowed)),
            (86155, K::PolicyViolation(P::BadBehavior)),
            (86156, K::PolicyViolation(P::GuestSession)),
            (86202, K::NeedNewKeys), // server session does not match the key
            (86211, K::SystemError(S::Netshield)),
            (86226, K::SystemError(S::NonRandomizedNat)),
            (86231, K::SystemError(S::SplitTcp)),
            (86241, K::SystemError(S::SafeMode)),
        ]);
        let statuses = HashMap::from([
            (401, K::SessionExpiredOrMissing),
            (409, K::NeedNewKeys), // key conflict
            (429, K::TooManyRequests),
        ]);
        Self { codes, statuses }
    }
}

impl ClassificationTable {
    /// Load overrides from a JSON file, layered on top of the built-in catalogue.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let overrides: ClassificationTable = serde_json::from_str(&contents)?;
        let mut table = Self::default();
        table.codes.extend(overrides.codes);
        table.statuses.extend(overrides.statuses);
        Ok(table)
    }
}

/// Total mapping from [`RemoteError`] to [`RefreshError`].
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    table: ClassificationTable,
}

impl ErrorClassifier {
    pub fn new(table: ClassificationTable) -> Self {
        Self { table }
    }

    pub fn classify(&self, err: &RemoteError) -> RefreshError {
        let kind = err
            .code
            .and_then(|code| self.table.codes.get(&code))
            .or_else(|| err.status.and_then(|status| self.table.statuses.get(&status)));

        match kind {
            Some(kind) => kind.to_error(err.retry_after),
            None => {
                error!(
                    status = ?err.status,
                    code = ?err.code,
                    err = %err.message,
                    "unclassified certificate refresh failure"
                );
                RefreshError::Unclassified(err.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
