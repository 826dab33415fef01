//! Verification job storage trait.

use crate::StoreError;
use verikey_types::{JobStatus, VerificationJob};

/// Trait for storing verification jobs.
pub trait JobStore {
    fn insert_job(&self, job: &VerificationJob) -> Result<(), StoreError>;

    fn get_job(&self, id: &str) -> Result<Option<VerificationJob>, StoreError>;

    /// Full-row update. Fails with `NotFound` if the job does not exist.
    fn update_job(&self, job: &VerificationJob) -> Result<(), StoreError>;

    /// Most recent job tracking `verification_id` whose status is in
    /// `statuses` (any status when the slice is empty). This is the
    /// duplicate-detection probe.
    fn latest_job_for_verification(
        &self,
        verification_id: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<VerificationJob>, StoreError>;

    /// Most recent job created with the given card key code. Consumed by
    /// the end-user result query.
    fn latest_job_for_key(&self, code: &str) -> Result<Option<VerificationJob>, StoreError>;
}
