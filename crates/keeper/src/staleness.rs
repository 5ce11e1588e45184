// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decide whether the stored certificate still serves the requested features.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::features::{ConnectionFeatures, SafeModeComparison};
use crate::store::StoredCertificate;

/// Verdict of [`evaluate`], with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// No certificate stored.
    Missing,
    /// Features were requested but none were recorded with the certificate.
    FeaturesUnknown,
    /// Requested features differ from the ones the certificate was issued for.
    FeaturesChanged,
    /// The (early) refresh deadline has passed.
    Due,
    /// Still good; `refresh_in` until the early deadline.
    Fresh { refresh_in: Duration },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Self::Fresh { .. })
    }
}

/// Evaluate staleness rules in order; the first match wins.
///
/// The effective deadline is `refresh_time - refresh_earlier_by`, pulled
/// earlier so that other refreshers of the same certificate are less likely
/// to race with this one.
pub fn evaluate(
    stored: Option<&StoredCertificate>,
    stored_features: Option<&ConnectionFeatures>,
    requested: Option<&ConnectionFeatures>,
    now: SystemTime,
    refresh_earlier_by: Duration,
) -> Staleness {
    let Some(stored) = stored else {
        return Staleness::Missing;
    };

    if let Some(requested) = requested {
        let Some(stored_features) = stored_features else {
            return Staleness::FeaturesUnknown;
        };
        if !stored_features.equals(requested, SafeModeComparison::Tolerant) {
            return Staleness::FeaturesChanged;
        }
    }

    let deadline = stored.refresh_time.checked_sub(refresh_earlier_by).unwrap_or(UNIX_EPOCH);
    match deadline.duration_since(now) {
        Ok(refresh_in) if !refresh_in.is_zero() => Staleness::Fresh { refresh_in },
        _ => Staleness::Due,
    }
}

/// Boolean form of [`evaluate`].
pub fn needs_refresh(
    stored: Option<&StoredCertificate>,
    stored_features: Option<&ConnectionFeatures>,
    requested: Option<&ConnectionFeatures>,
    now: SystemTime,
    refresh_earlier_by: Duration,
) -> bool {
    evaluate(stored, stored_features, requested, now, refresh_earlier_by).is_stale()
}

#[cfg(test)]
#[path = "staleness_tests.rs"]
mod tests;
