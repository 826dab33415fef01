//! Pipeline configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use verikey_types::VerifyParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Invalid(String),
}

/// Configuration for the verification pipeline.
///
/// Can be loaded from a TOML file via [`VerifyConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Base URL of the external verification service.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// Access secret presented to the upstream service with every batch.
    /// Jobs settle as errors while this is empty.
    #[serde(default)]
    pub upstream_secret: String,

    /// Program identifier sent with each batch submission.
    #[serde(default = "default_program_id")]
    pub program_id: String,

    /// Data directory for the LMDB store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Timing and sizing knobs.
    #[serde(default)]
    pub params: VerifyParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_upstream_base_url() -> String {
    "https://neigui.1key.me".to_string()
}

fn default_program_id() -> String {
    "google-student".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./verikey_data")
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl VerifyConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            upstream_base_url: default_upstream_base_url(),
            upstream_secret: String::new(),
            program_id: default_program_id(),
            data_dir: default_data_dir(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            params: VerifyParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = VerifyConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.program_id, "google-student");
        assert_eq!(config.log_format, "human");
        assert_eq!(config.params.verify_timeout_ms, 60_000);
        assert!(config.upstream_secret.is_empty());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            upstream_secret = "cdk-123"

            [params]
            verify_timeout_ms = 5000
        "#;
        let config = VerifyConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.upstream_secret, "cdk-123");
        assert_eq!(config.params.verify_timeout_ms, 5000);
        assert_eq!(config.params.poll_interval_ms, 2000); // default
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(VerifyConfig::from_toml_str("upstream_secret = [").is_err());
    }
}
