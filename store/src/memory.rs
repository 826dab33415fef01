//! In-memory storage backend.
//!
//! The reference implementation of the storage traits, used by tests and
//! development setups. A single mutex serializes all writers, which makes
//! the conditional-update semantics trivially correct: the read-compare-
//! write of `replace_key_if` happens entirely inside one critical section,
//! exactly as an LMDB write transaction scopes it in the persistent
//! backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use verikey_types::{CardKey, DailyStats, JobStatus, KeyStatus, VerificationJob};

use crate::card_key::{CardKeyGuard, CardKeyStore};
use crate::job::JobStore;
use crate::stats::StatsStore;
use crate::{Store, StoreError};

#[derive(Default)]
struct Inner {
    keys: BTreeMap<String, CardKey>,
    jobs: BTreeMap<String, VerificationJob>,
    /// Job ids per verification id, in insertion order.
    jobs_by_vid: BTreeMap<String, Vec<String>>,
    /// Global job insertion order, for most-recent-first scans.
    job_order: Vec<String>,
    stats: BTreeMap<String, DailyStats>,
}

/// In-memory backend guarded by one mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex only happens after a panic in another test
        // thread; propagating the inner state is still sound for a map.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn insert_job_locked(inner: &mut Inner, job: &VerificationJob) -> Result<(), StoreError> {
    if inner.jobs.contains_key(&job.id) {
        return Err(StoreError::Duplicate(format!("job '{}'", job.id)));
    }
    if let Some(vid) = &job.verification_id {
        inner
            .jobs_by_vid
            .entry(vid.clone())
            .or_default()
            .push(job.id.clone());
    }
    inner.job_order.push(job.id.clone());
    inner.jobs.insert(job.id.clone(), job.clone());
    Ok(())
}

impl CardKeyStore for MemoryStore {
    fn get_key(&self, code: &str) -> Result<Option<CardKey>, StoreError> {
        Ok(self.locked().keys.get(code).cloned())
    }

    fn insert_key(&self, key: &CardKey) -> Result<(), StoreError> {
        let mut inner = self.locked();
        if inner.keys.contains_key(&key.code) {
            return Err(StoreError::Duplicate(format!("card key '{}'", key.code)));
        }
        inner.keys.insert(key.code.clone(), key.clone());
        Ok(())
    }

    fn replace_key_if(&self, guard: &CardKeyGuard, new_row: &CardKey) -> Result<bool, StoreError> {
        let mut inner = self.locked();
        match inner.keys.get(&new_row.code) {
            Some(current) if guard.matches(current) => {
                inner.keys.insert(new_row.code.clone(), new_row.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_keys(&self, status: Option<KeyStatus>) -> Result<Vec<CardKey>, StoreError> {
        let inner = self.locked();
        Ok(inner
            .keys
            .values()
            .filter(|k| status.is_none_or(|s| k.status == s))
            .cloned()
            .collect())
    }
}

impl JobStore for MemoryStore {
    fn insert_job(&self, job: &VerificationJob) -> Result<(), StoreError> {
        insert_job_locked(&mut self.locked(), job)
    }

    fn get_job(&self, id: &str) -> Result<Option<VerificationJob>, StoreError> {
        Ok(self.locked().jobs.get(id).cloned())
    }

    fn update_job(&self, job: &VerificationJob) -> Result<(), StoreError> {
        let mut inner = self.locked();
        if !inner.jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound(format!("job '{}'", job.id)));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn latest_job_for_verification(
        &self,
        verification_id: &str,
        statuses: &[JobStatus],
    ) -> Result<Option<VerificationJob>, StoreError> {
        let inner = self.locked();
        let Some(ids) = inner.jobs_by_vid.get(verification_id) else {
            return Ok(None);
        };
        for id in ids.iter().rev() {
            let job = inner
                .jobs
                .get(id)
                .ok_or_else(|| StoreError::Corruption(format!("dangling job index '{id}'")))?;
            if statuses.is_empty() || statuses.contains(&job.status) {
                return Ok(Some(job.clone()));
            }
        }
        Ok(None)
    }

    fn latest_job_for_key(&self, code: &str) -> Result<Option<VerificationJob>, StoreError> {
        let inner = self.locked();
        for id in inner.job_order.iter().rev() {
            if let Some(job) = inner.jobs.get(id) {
                if job.card_key_code == code {
                    return Ok(Some(job.clone()));
                }
            }
        }
        Ok(None)
    }
}

impl StatsStore for MemoryStore {
    fn bump_daily(&self, date: &str, success: bool) -> Result<(), StoreError> {
        let mut inner = self.locked();
        inner
            .stats
            .entry(date.to_string())
            .or_insert_with(|| DailyStats::new(date))
            .record(success);
        Ok(())
    }

    fn get_daily(&self, date: &str) -> Result<Option<DailyStats>, StoreError> {
        Ok(self.locked().stats.get(date).cloned())
    }
}

impl Store for MemoryStore {
    fn lock_key_and_create_job(
        &self,
        guard: &CardKeyGuard,
        locked: &CardKey,
        job: &VerificationJob,
    ) -> Result<bool, StoreError> {
        let mut inner = self.locked();
        match inner.keys.get(&locked.code) {
            Some(current) if guard.matches(current) => {}
            _ => return Ok(false),
        }
        inner.keys.insert(locked.code.clone(), locked.clone());
        insert_job_locked(&mut inner, job)?;
        Ok(true)
    }
}
