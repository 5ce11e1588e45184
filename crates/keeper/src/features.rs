// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection features embedded in a certificate request.
//!
//! The issuer bakes the requested feature set into the certificate, so a
//! change in any flag means the stored certificate no longer matches what the
//! tunnel wants and has to be replaced.

use serde::{Deserialize, Serialize};

/// NetShield filtering level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetShieldLevel {
    #[default]
    Off,
    Malware,
    MalwareAdsTrackers,
}

impl NetShieldLevel {
    /// Numeric level as sent to the issuer.
    pub fn as_level(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Malware => 1,
            Self::MalwareAdsTrackers => 2,
        }
    }
}

/// NAT mode requested for the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    #[default]
    Strict,
    Moderate,
}

/// How the `safe_mode` flag participates in feature comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeModeComparison {
    /// `safe_mode` must match exactly, including presence.
    Strict,
    /// An unset `safe_mode` on either side matches any value.
    Tolerant,
}

/// Immutable set of feature flags requested for (or embedded in) a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFeatures {
    #[serde(default)]
    pub netshield: NetShieldLevel,
    #[serde(default = "default_true")]
    pub vpn_accelerator: bool,
    #[serde(default)]
    pub nat_type: NatType,
    /// Split-TCP / bouncing selector, when the server supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bouncing: Option<String>,
    /// `None` when the account has no say over safe mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_mode: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl ConnectionFeatures {
    /// Compare two feature sets, treating `safe_mode` according to `mode`.
    pub fn equals(&self, other: &Self, mode: SafeModeComparison) -> bool {
        let core = self.netshield == other.netshield
            && self.vpn_accelerator == other.vpn_accelerator
            && self.nat_type == other.nat_type
            && self.bouncing == other.bouncing;
        if !core {
            return false;
        }

        match mode {
            SafeModeComparison::Strict => self.safe_mode == other.safe_mode,
            SafeModeComparison::Tolerant => match (self.safe_mode, other.safe_mode) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            },
        }
    }

    /// Issuer wire representation (`Features` object of the certificate request).
    pub fn to_request_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("NetShieldLevel".to_owned(), self.netshield.as_level().into());
        map.insert("RandomNAT".to_owned(), (self.nat_type == NatType::Moderate).into());
        map.insert("SplitTCP".to_owned(), self.vpn_accelerator.into());
        if let Some(ref bouncing) = self.bouncing {
            map.insert("Bouncing".to_owned(), bouncing.clone().into());
        }
        if let Some(safe_mode) = self.safe_mode {
            map.insert("SafeMode".to_owned(), safe_mode.into());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;
