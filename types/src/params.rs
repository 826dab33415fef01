//! Tunable pipeline parameters with production defaults.

use serde::{Deserialize, Serialize};

/// Timing and sizing knobs for the verification pipeline.
///
/// Production values match the upstream protocol's observed behavior; tests
/// shrink the timing fields to keep runs fast. Every field has a serde
/// default so a partial `[params]` table in a config file works.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyParams {
    /// Hard end-to-end deadline per job, measured from job start.
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,

    /// Sleep between status polls while a verification is under review.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bound on each individual upstream HTTP call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum `(link, card key)` pairs accepted in one batch.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Batch submissions allowed per client per rate window.
    #[serde(default = "default_batch_rate_limit")]
    pub batch_rate_limit: u32,

    /// Admin login attempts allowed per client per rate window.
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit: u32,

    /// Rate limiter window length in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_verify_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_batch() -> usize {
    20
}

fn default_batch_rate_limit() -> u32 {
    10
}

fn default_login_rate_limit() -> u32 {
    5
}

fn default_rate_window_secs() -> u64 {
    60
}

impl Default for VerifyParams {
    fn default() -> Self {
        Self {
            verify_timeout_ms: default_verify_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_batch: default_max_batch(),
            batch_rate_limit: default_batch_rate_limit(),
            login_rate_limit: default_login_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let params = VerifyParams::default();
        assert_eq!(params.verify_timeout_ms, 60_000);
        assert_eq!(params.poll_interval_ms, 2_000);
        assert_eq!(params.max_batch, 20);
        assert_eq!(params.batch_rate_limit, 10);
        assert_eq!(params.login_rate_limit, 5);
    }
}
