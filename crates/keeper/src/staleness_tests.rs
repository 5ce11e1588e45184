// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;
use crate::features::{NatType, NetShieldLevel};

const EARLIER_BY: Duration = Duration::from_secs(180);

fn now() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_800_000_000)
}

fn cert_refreshing_in(secs: i64) -> StoredCertificate {
    let refresh_time = if secs >= 0 {
        now() + Duration::from_secs(secs as u64)
    } else {
        now() - Duration::from_secs(secs.unsigned_abs())
    };
    StoredCertificate {
        certificate: vec![0xc3],
        valid_until: refresh_time + Duration::from_secs(3600),
        refresh_time,
    }
}

fn features(safe_mode: Option<bool>) -> ConnectionFeatures {
    ConnectionFeatures { safe_mode, ..ConnectionFeatures::default() }
}

#[test]
fn missing_certificate_is_stale() {
    let requested = features(None);
    assert_eq!(evaluate(None, None, None, now(), EARLIER_BY), Staleness::Missing);
    assert_eq!(evaluate(None, Some(&requested), Some(&requested), now(), EARLIER_BY), Staleness::Missing);
}

#[test]
fn requested_features_without_record_is_stale() {
    let cert = cert_refreshing_in(3600);
    let requested = features(None);
    assert_eq!(
        evaluate(Some(&cert), None, Some(&requested), now(), EARLIER_BY),
        Staleness::FeaturesUnknown
    );
}

#[test]
fn changed_features_are_stale() {
    let cert = cert_refreshing_in(3600);
    let stored = features(None);
    let requested = ConnectionFeatures { netshield: NetShieldLevel::Malware, ..stored.clone() };
    assert_eq!(
        evaluate(Some(&cert), Some(&stored), Some(&requested), now(), EARLIER_BY),
        Staleness::FeaturesChanged
    );
}

#[test]
fn unset_safe_mode_compared_tolerantly() {
    let cert = cert_refreshing_in(3600);
    let stored = features(Some(true));
    let requested = features(None);
    assert!(!needs_refresh(Some(&cert), Some(&stored), Some(&requested), now(), EARLIER_BY));
}

#[test]
fn no_requested_features_skips_feature_rules() {
    let cert = cert_refreshing_in(3600);
    assert!(!needs_refresh(Some(&cert), None, None, now(), EARLIER_BY));
}

#[yare::parameterized(
    well_ahead = { 3600, false },
    just_outside_margin = { 181, false },
    exactly_at_margin = { 180, true },
    inside_margin = { 60, true },
    refresh_time_now = { 0, true },
    past = { -600, true },
)]
fn deadline_pulled_earlier(refresh_in_secs: i64, stale: bool) {
    let cert = cert_refreshing_in(refresh_in_secs);
    assert_eq!(needs_refresh(Some(&cert), None, None, now(), EARLIER_BY), stale);
}

#[test]
fn fresh_reports_time_until_early_deadline() {
    let cert = cert_refreshing_in(1000);
    assert_eq!(
        evaluate(Some(&cert), None, None, now(), EARLIER_BY),
        Staleness::Fresh { refresh_in: Duration::from_secs(820) }
    );
}

#[test]
fn feature_rules_checked_before_expiry() {
    let cert = cert_refreshing_in(-600);
    let stored = features(None);
    let requested = ConnectionFeatures { nat_type: NatType::Moderate, ..stored.clone() };
    assert_eq!(
        evaluate(Some(&cert), Some(&stored), Some(&requested), now(), EARLIER_BY),
        Staleness::FeaturesChanged
    );
}

fn features_strategy() -> impl Strategy<Value = ConnectionFeatures> {
    (
        prop::sample::select(vec![
            NetShieldLevel::Off,
            NetShieldLevel::Malware,
            NetShieldLevel::MalwareAdsTrackers,
        ]),
        any::<bool>(),
        prop::sample::select(vec![NatType::Strict, NatType::Moderate]),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(netshield, vpn_accelerator, nat_type, safe_mode)| ConnectionFeatures {
            netshield,
            vpn_accelerator,
            nat_type,
            bouncing: None,
            safe_mode,
        })
}

proptest! {
    #[test]
    fn no_certificate_always_stale(
        requested in prop::option::of(features_strategy()),
        stored_features in prop::option::of(features_strategy()),
        earlier_by in 0u64..86_400,
    ) {
        prop_assert!(needs_refresh(
            None,
            stored_features.as_ref(),
            requested.as_ref(),
            now(),
            Duration::from_secs(earlier_by),
        ));
    }

    #[test]
    fn past_deadline_always_stale(
        requested in prop::option::of(features_strategy()),
        overdue in 0i64..86_400,
    ) {
        let cert = cert_refreshing_in(180 - overdue);
        let stored = requested.clone();
        prop_assert!(needs_refresh(
            Some(&cert),
            stored.as_ref(),
            requested.as_ref(),
            now(),
            EARLIER_BY,
        ));
    }

    #[test]
    fn matching_features_before_deadline_not_stale(
        requested in features_strategy(),
        ahead in 181i64..86_400,
    ) {
        let cert = cert_refreshing_in(ahead);
        let stored = ConnectionFeatures { safe_mode: None, ..requested.clone() };
        prop_assert!(!needs_refresh(
            Some(&cert),
            Some(&stored),
            Some(&requested),
            now(),
            EARLIER_BY,
        ));
    }

    #[test]
    fn evaluation_is_deterministic(
        requested in prop::option::of(features_strategy()),
        stored_features in prop::option::of(features_strategy()),
        refresh_in in -86_400i64..86_400,
    ) {
        let cert = cert_refreshing_in(refresh_in);
        let first = evaluate(Some(&cert), stored_features.as_ref(), requested.as_ref(), now(), EARLIER_BY);
        let second = evaluate(Some(&cert), stored_features.as_ref(), requested.as_ref(), now(), EARLIER_BY);
        prop_assert_eq!(first, second);
    }
}
