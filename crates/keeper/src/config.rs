// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the certkeeper daemon.
#[derive(Debug, Clone, clap::Args)]
pub struct KeeperConfig {
    /// Host to bind the control API on.
    #[arg(long, default_value = "127.0.0.1", env = "CERTKEEPER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "CERTKEEPER_PORT")]
    pub port: u16,

    /// Bearer token for the control API. If unset, auth is disabled.
    #[arg(long, env = "CERTKEEPER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Base URL of the certificate issuing service.
    #[arg(long, default_value = "https://vpn-api.proton.me", env = "CERTKEEPER_ISSUER_URL")]
    pub issuer_url: String,

    /// Directory holding keys and the current certificate.
    #[arg(long, env = "CERTKEEPER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Max time a refresh waits for the in-flight one, in milliseconds.
    #[arg(long, default_value_t = 120_000, env = "CERTKEEPER_WAIT_TIMEOUT_MS")]
    pub wait_timeout_ms: u64,

    /// Periodic staleness check interval in milliseconds.
    #[arg(long, default_value_t = 120_000, env = "CERTKEEPER_CHECK_INTERVAL_MS")]
    pub check_interval_ms: u64,

    /// Refresh this many milliseconds before the certificate's refresh time.
    ///
    /// Should exceed the check interval so at least one check lands in the window.
    #[arg(long, default_value_t = 180_000, env = "CERTKEEPER_REFRESH_EARLIER_BY_MS")]
    pub refresh_earlier_by_ms: u64,

    /// Backoff applied to rate limiting without a `Retry-After` hint.
    #[arg(long, default_value_t = 60_000, env = "CERTKEEPER_DEFAULT_BACKOFF_MS")]
    pub default_backoff_ms: u64,

    /// Requested certificate lifetime forwarded to the issuer (e.g. "30 minutes").
    #[arg(long, env = "CERTKEEPER_CERTIFICATE_DURATION")]
    pub certificate_duration: Option<String>,

    /// JSON file overriding the built-in error classification table.
    #[arg(long, env = "CERTKEEPER_CLASSIFICATION_TABLE")]
    pub classification_table: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "CERTKEEPER_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl KeeperConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wait_timeout_ms == 0 {
            anyhow::bail!("--wait-timeout-ms must be greater than zero");
        }
        if self.check_interval_ms == 0 {
            anyhow::bail!("--check-interval-ms must be greater than zero");
        }
        if !self.issuer_url.starts_with("http://") && !self.issuer_url.starts_with("https://") {
            anyhow::bail!("--issuer-url must be an http(s) URL: {}", self.issuer_url);
        }
        if self.refresh_earlier_by_ms < self.check_interval_ms {
            tracing::warn!(
                refresh_earlier_by_ms = self.refresh_earlier_by_ms,
                check_interval_ms = self.check_interval_ms,
                "refresh margin shorter than check interval; a check may miss the window"
            );
        }
        Ok(())
    }

    pub fn intervals(&self) -> RefreshIntervals {
        RefreshIntervals {
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            check_interval: Duration::from_millis(self.check_interval_ms),
            refresh_earlier_by: Duration::from_millis(self.refresh_earlier_by_ms),
            default_backoff: Duration::from_millis(self.default_backoff_ms),
        }
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir`, then `$XDG_STATE_HOME/certkeeper`,
    /// then `$HOME/.local/state/certkeeper`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("certkeeper");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/certkeeper");
        }
        PathBuf::from(".certkeeper")
    }
}

/// Timing knobs for the refresh core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    /// Max time a caller blocks waiting for the serializer.
    pub wait_timeout: Duration,
    /// Periodic trigger period.
    pub check_interval: Duration,
    /// Margin subtracted from the certificate's refresh time.
    pub refresh_earlier_by: Duration,
    /// Backoff for rate limiting without an explicit hint.
    pub default_backoff: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(2 * 60),
            check_interval: Duration::from_secs(2 * 60),
            refresh_earlier_by: Duration::from_secs(3 * 60),
            default_backoff: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
