//! LMDB implementation of JobStore.
//!
//! Two secondary indexes are maintained alongside the primary `jobs`
//! database: `jobs_by_vid` (verification id → job ids in insertion order,
//! for the duplicate probe) and `jobs_order` (big-endian `created_at` ++
//! id composite key, for creation-ordered reverse scans).

use heed::RwTxn;

use verikey_store::{JobStore, StoreError};
use verikey_types::{JobStatus, VerificationJob};

use crate::{LmdbError, LmdbStore};

/// Composite key `created_at_be ++ id`. Big-endian millis sort
/// chronologically; the id suffix disambiguates same-millisecond inserts.
fn order_key(job: &VerificationJob) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + job.id.len());
    key.extend_from_slice(&job.created_at.as_millis().to_be_bytes());
    key.extend_from_slice(job.id.as_bytes());
    key
}

/// Insert a job and maintain both indexes inside the caller's transaction.
/// Shared between `insert_job` and the atomic lock-and-create operation.
pub(crate) fn insert_job_txn(
    store: &LmdbStore,
    wtxn: &mut RwTxn<'_>,
    job: &VerificationJob,
) -> Result<(), StoreError> {
    if store
        .jobs
        .get(wtxn, job.id.as_bytes())
        .map_err(LmdbError::from)?
        .is_some()
    {
        return Err(StoreError::Duplicate(format!("job '{}'", job.id)));
    }

    let bytes = bincode::serialize(job).map_err(LmdbError::from)?;
    store
        .jobs
        .put(wtxn, job.id.as_bytes(), &bytes)
        .map_err(LmdbError::from)?;

    if let Some(vid) = &job.verification_id {
        let mut ids: Vec<String> = match store
            .jobs_by_vid
            .get(wtxn, vid.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(existing) => bincode::deserialize(existing).map_err(LmdbError::from)?,
            None => Vec::new(),
        };
        ids.push(job.id.clone());
        let encoded = bincode::serialize(&ids).map_err(LmdbError::from)?;
        store
            .jobs_by_vid
            .put(wtxn, vid.as_bytes(), &encoded)
            .map_err(LmdbError::from)?;
    }

    store
        .jobs_order
        .put(wtxn, &order_key(job), job.id.as_bytes())
        .map_err(LmdbError::from)?;
    Ok(())
}

impl JobStore for LmdbStore {
    fn insert_job(&self, job: &VerificationJob) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        insert_job_txn(self, &mut wtxn, job)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<VerificationJob>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .jobs
            .get(&rtxn, id.as_bytes())
            .map_err(LmdbError::from)?;
        match val {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn update_job(&self, job: &VerificationJob) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .jobs
            .get(&wtxn, job.id.as_bytes())
            .map_err(LmdbError::from)?
            .is_none()
        {
            return Err(StoreError::NotFound(format!("job '{}'", job.id)));
        }
        let bytes = bincode::serialize(job).map_err(LmdbError::from)?;
        self.jobs
            .put(&mut wtxn, job.id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn latest_job_for_verification(
        &self,
        verification_id: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<VerificationJob>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(encoded) = self
            .jobs_by_vid
            .get(&rtxn, verification_id.as_bytes())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        let ids: Vec<String> = bincode::deserialize(encoded).map_err(LmdbError::from)?;
        for id in ids.iter().rev() {
            let bytes = self
                .jobs
                .get(&rtxn, id.as_bytes())
                .map_err(LmdbError::from)?
                .ok_or_else(|| StoreError::Corruption(format!("dangling job index '{id}'")))?;
            let job: VerificationJob = bincode::deserialize(bytes).map_err(LmdbError::from)?;
            if statuses.is_empty() || statuses.contains(&job.status) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    fn latest_job_for_key(&self, code: &str) -> Result<Option<VerificationJob>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.jobs_order.rev_iter(&rtxn).map_err(LmdbError::from)?;
        for entry in iter {
            let (_order, id) = entry.map_err(LmdbError::from)?;
            let bytes = self
                .jobs
                .get(&rtxn, id)
                .map_err(LmdbError::from)?
                .ok_or_else(|| StoreError::Corruption("dangling order index".to_string()))?;
            let job: VerificationJob = bincode::deserialize(bytes).map_err(LmdbError::from)?;
            if job.card_key_code == code {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }
}
