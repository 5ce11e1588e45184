// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Result of one refresh attempt.
pub type RefreshOutcome = Result<(), RefreshError>;

/// Policy the issuer enforces against the account or the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolation {
    RestrictedServer,
    LowPlan,
    Delinquent,
    TorrentNotAllowed,
    BadBehavior,
    GuestSession,
    MaxSessionsUnknown,
    MaxSessionsFree,
    MaxSessionsBasic,
    MaxSessionsPlus,
    MaxSessionsVisionary,
    MaxSessionsPro,
}

/// Issuer-side failure that is not the client's fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemErrorKind {
    ServerError,
    BadCertificateSignature,
    CertificateNotProvided,
    Netshield,
    NonRandomizedNat,
    SplitTcp,
    SafeMode,
}

/// Failure outcome of a refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The serializer could not be acquired within the wait timeout.
    TimedOut,
    /// The operation was cancelled, usually because the coordinator stopped.
    Cancelled,
    /// The key pair is missing or was rejected.
    NeedNewKeys,
    /// The API session is gone; the host must re-authenticate.
    SessionExpiredOrMissing,
    TooManyRequests { retry_after: Option<Duration> },
    PolicyViolation(PolicyViolation),
    CertificateRevoked,
    CertificateExpired,
    SystemError(SystemErrorKind),
    /// No classification matched.
    Unclassified(String),
}

/// What the host should do about an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    RegenerateKeys,
    Reauthenticate,
    BackOff(Duration),
    Retry,
    Ignore,
    Surface,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegenerateKeys => "regenerate_keys",
            Self::Reauthenticate => "reauthenticate",
            Self::BackOff(_) => "back_off",
            Self::Retry => "retry",
            Self::Ignore => "ignore",
            Self::Surface => "surface",
        }
    }
}

impl RefreshError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
            Self::NeedNewKeys => "NEED_NEW_KEYS",
            Self::SessionExpiredOrMissing => "SESSION_EXPIRED",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::PolicyViolation(_) => "POLICY_VIOLATION",
            Self::CertificateRevoked => "CERTIFICATE_REVOKED",
            Self::CertificateExpired => "CERTIFICATE_EXPIRED",
            Self::SystemError(_) => "SYSTEM_ERROR",
            Self::Unclassified(_) => "UNCLASSIFIED",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::TimedOut => 503,
            Self::Cancelled => 409,
            Self::NeedNewKeys => 409,
            Self::SessionExpiredOrMissing => 401,
            Self::TooManyRequests { .. } => 429,
            Self::PolicyViolation(_) => 403,
            Self::CertificateRevoked | Self::CertificateExpired => 403,
            Self::SystemError(_) => 502,
            Self::Unclassified(_) => 500,
        }
    }

    /// `NeedNewKeys` and `SessionExpiredOrMissing` require the host to act
    /// before anything can succeed again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NeedNewKeys | Self::SessionExpiredOrMissing)
    }

    /// Map to the single recovery action the host should take.
    pub fn recovery(&self, default_backoff: Duration) -> RecoveryAction {
        match self {
            Self::NeedNewKeys => RecoveryAction::RegenerateKeys,
            Self::SessionExpiredOrMissing => RecoveryAction::Reauthenticate,
            Self::TooManyRequests { retry_after } => {
                RecoveryAction::BackOff(retry_after.unwrap_or(default_backoff))
            }
            Self::TimedOut => RecoveryAction::Retry,
            Self::Cancelled => RecoveryAction::Ignore,
            Self::PolicyViolation(_)
            | Self::CertificateRevoked
            | Self::CertificateExpired
            | Self::SystemError(_)
            | Self::Unclassified(_) => RecoveryAction::Surface,
        }
    }

    /// A back-off without an explicit `retry_after` reports `default_backoff`.
    pub fn to_error_body(&self, default_backoff: Duration) -> ErrorBody {
        let recovery = self.recovery(default_backoff);
        let retry_after_secs = match recovery {
            RecoveryAction::BackOff(d) => Some(d.as_secs()),
            _ => None,
        };
        ErrorBody {
            code: self.as_str().to_owned(),
            message: self.to_string(),
            retry_after_secs,
            recovery: Some(recovery.as_str().to_owned()),
        }
    }

    pub fn to_http_response(&self, default_backoff: Duration) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: self.to_error_body(default_backoff) }))
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out waiting for in-flight refresh"),
            Self::Cancelled => f.write_str("refresh cancelled"),
            Self::NeedNewKeys => f.write_str("key pair missing or rejected"),
            Self::SessionExpiredOrMissing => f.write_str("api session expired or missing"),
            Self::TooManyRequests { retry_after: Some(d) } => {
                write!(f, "too many certificate requests, retry after {}s", d.as_secs())
            }
            Self::TooManyRequests { retry_after: None } => {
                f.write_str("too many certificate requests")
            }
            Self::PolicyViolation(v) => write!(f, "policy violation: {v:?}"),
            Self::CertificateRevoked => f.write_str("certificate revoked"),
            Self::CertificateExpired => f.write_str("certificate expired"),
            Self::SystemError(kind) => write!(f, "system error: {kind:?}"),
            Self::Unclassified(msg) => write!(f, "refresh failed: {msg}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Tag of the [`RecoveryAction`] the host should take.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
}

impl ErrorBody {
    /// Body for failures outside the refresh taxonomy (auth, bad input).
    pub fn plain(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
            retry_after_secs: None,
            recovery: None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
