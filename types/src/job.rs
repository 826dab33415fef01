//! Verification job records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::Timestamp;

/// Job state machine:
/// `Queued → Processing → (Pending ⇄ polling) → {Success, Fail, Error, Timeout}`.
///
/// The four terminal states are absorbing; no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    /// Under external review; the orchestrator polls with a check token.
    Pending,
    Success,
    Fail,
    Error,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Error | Self::Timeout)
    }

    /// Statuses that make a newer submission for the same verification id a
    /// duplicate: anything still in flight, plus a completed success.
    pub fn blocks_duplicates(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Processing | Self::Pending | Self::Success
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

/// One attempt to activate one verification identifier using one card key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationJob {
    pub id: String,
    /// The raw link text the identifier was extracted from.
    pub source_link: String,
    pub card_key_code: String,
    /// Resolved at creation time by the batch path; direct `process_job`
    /// callers may still pass jobs with this unset.
    pub verification_id: Option<String>,
    pub status: JobStatus,
    pub result_message: Option<String>,
    pub result_url: Option<String>,
    pub error_code: Option<String>,
    pub upstream_request_id: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    /// Set only at settlement, together with `duration_ms`.
    pub finished_at: Option<Timestamp>,
    pub duration_ms: Option<u64>,
}

impl VerificationJob {
    pub fn new(
        id: impl Into<String>,
        source_link: impl Into<String>,
        card_key_code: impl Into<String>,
        verification_id: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            source_link: source_link.into(),
            card_key_code: card_key_code.into(),
            verification_id,
            status: JobStatus::Queued,
            result_message: None,
            result_url: None,
            error_code: None,
            upstream_request_id: None,
            created_at,
            started_at: None,
            finished_at: None,
            duration_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_the_four() {
        let terminal = [
            JobStatus::Success,
            JobStatus::Fail,
            JobStatus::Error,
            JobStatus::Timeout,
        ];
        let live = [JobStatus::Queued, JobStatus::Processing, JobStatus::Pending];
        assert!(terminal.iter().all(JobStatus::is_terminal));
        assert!(live.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn duplicate_probe_covers_in_flight_and_success() {
        assert!(JobStatus::Queued.blocks_duplicates());
        assert!(JobStatus::Pending.blocks_duplicates());
        assert!(JobStatus::Success.blocks_duplicates());
        assert!(!JobStatus::Fail.blocks_duplicates());
        assert!(!JobStatus::Timeout.blocks_duplicates());
    }

    #[test]
    fn new_job_starts_queued_without_timing() {
        let job = VerificationJob::new("j1", "link", "key", None, Timestamp::new(7));
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
        assert!(job.duration_ms.is_none());
    }
}
