//! Error taxonomy for the job pipeline.
//!
//! Two classes matter at the surface: domain errors (malformed identifier,
//! card key not usable) are safe to show to the end user verbatim;
//! everything else — transport, storage — is logged in full server-side
//! and replaced with a generic message before it leaves the pipeline.

use thiserror::Error;
use tracing::warn;

use crate::ident::IdentError;
use crate::keys::KeyError;
use verikey_store::StoreError;
use verikey_upstream::UpstreamError;

/// The message shown to users for failures they must not see in detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "failed to create verification task";

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Ident(#[from] IdentError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("verification job not found: {0}")]
    JobNotFound(String),
}

impl VerifyError {
    /// Render this error for the end user. Domain errors pass through
    /// verbatim; the rest are logged here and genericized.
    pub fn surface_message(&self) -> String {
        match self {
            VerifyError::Ident(e) => e.to_string(),
            VerifyError::Key(e) => e.to_string(),
            other => {
                warn!(error = %other, "verification failure surfaced as generic message");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_surface_verbatim() {
        let err = VerifyError::from(KeyError::Exhausted);
        assert_eq!(err.surface_message(), KeyError::Exhausted.to_string());

        let err = VerifyError::from(IdentError::BadPrefix);
        assert_eq!(err.surface_message(), IdentError::BadPrefix.to_string());
    }

    #[test]
    fn transport_and_storage_errors_are_genericized() {
        let err = VerifyError::from(UpstreamError::Transport("connection refused".into()));
        assert_eq!(err.surface_message(), GENERIC_FAILURE_MESSAGE);

        let err = VerifyError::from(StoreError::Backend("lmdb wedged".into()));
        assert_eq!(err.surface_message(), GENERIC_FAILURE_MESSAGE);
        assert!(!err.surface_message().contains("lmdb"));
    }
}
