// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

#[yare::parameterized(
    need_new_keys = { RefreshError::NeedNewKeys, RecoveryAction::RegenerateKeys },
    session = { RefreshError::SessionExpiredOrMissing, RecoveryAction::Reauthenticate },
    explicit_backoff = {
        RefreshError::TooManyRequests { retry_after: Some(Duration::from_secs(5)) },
        RecoveryAction::BackOff(Duration::from_secs(5))
    },
    default_backoff = {
        RefreshError::TooManyRequests { retry_after: None },
        RecoveryAction::BackOff(DEFAULT_BACKOFF)
    },
    timed_out = { RefreshError::TimedOut, RecoveryAction::Retry },
    cancelled = { RefreshError::Cancelled, RecoveryAction::Ignore },
    revoked = { RefreshError::CertificateRevoked, RecoveryAction::Surface },
    expired = { RefreshError::CertificateExpired, RecoveryAction::Surface },
    policy = { RefreshError::PolicyViolation(PolicyViolation::LowPlan), RecoveryAction::Surface },
    system = { RefreshError::SystemError(SystemErrorKind::SafeMode), RecoveryAction::Surface },
    unclassified = { RefreshError::Unclassified("boom".into()), RecoveryAction::Surface },
)]
fn recovery_action(error: RefreshError, expected: RecoveryAction) {
    assert_eq!(error.recovery(DEFAULT_BACKOFF), expected);
}

#[test]
fn only_keys_and_session_are_fatal() {
    assert!(RefreshError::NeedNewKeys.is_fatal());
    assert!(RefreshError::SessionExpiredOrMissing.is_fatal());
    assert!(!RefreshError::TimedOut.is_fatal());
    assert!(!RefreshError::TooManyRequests { retry_after: None }.is_fatal());
}

#[test]
fn error_body_carries_retry_after() {
    let body = RefreshError::TooManyRequests { retry_after: Some(Duration::from_secs(30)) }
        .to_error_body(DEFAULT_BACKOFF);
    assert_eq!(body.code, "TOO_MANY_REQUESTS");
    assert_eq!(body.retry_after_secs, Some(30));
    assert_eq!(body.recovery.as_deref(), Some("back_off"));

    let body = RefreshError::NeedNewKeys.to_error_body(DEFAULT_BACKOFF);
    assert_eq!(body.code, "NEED_NEW_KEYS");
    assert!(body.retry_after_secs.is_none());
    assert_eq!(body.recovery.as_deref(), Some("regenerate_keys"));
}

#[test]
fn error_body_falls_back_to_default_backoff() {
    let body = RefreshError::TooManyRequests { retry_after: None }.to_error_body(DEFAULT_BACKOFF);
    assert_eq!(body.retry_after_secs, Some(60));
    assert_eq!(body.recovery.as_deref(), Some("back_off"));
}

#[test]
fn http_response_status() {
    let (status, _) = RefreshError::SessionExpiredOrMissing.to_http_response(DEFAULT_BACKOFF);
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) =
        RefreshError::TooManyRequests { retry_after: None }.to_http_response(DEFAULT_BACKOFF);
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
