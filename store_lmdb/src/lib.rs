//! LMDB storage backend for the verikey verification pipeline.
//!
//! Implements the storage traits from `verikey-store` using the `heed`
//! LMDB bindings. All records live in one environment, one database per
//! record family plus two secondary indexes on jobs:
//!
//! - `card_keys`:   code → bincode [`CardKey`]
//! - `jobs`:        id → bincode [`VerificationJob`]
//! - `jobs_by_vid`: verification id → bincode `Vec<job id>` (insertion order)
//! - `jobs_order`:  `created_at_be ++ id` → id (creation-ordered scans)
//! - `daily_stats`: date key → bincode [`DailyStats`]
//!
//! LMDB serializes write transactions, so the read-compare-write inside
//! [`replace_key_if`](verikey_store::CardKeyStore::replace_key_if) is a true
//! conditional update: a caller that lost the race observes the mismatch
//! and returns `Ok(false)` without writing anything.

pub mod card_key;
pub mod error;
pub mod job;
pub mod stats;

pub use error::LmdbError;

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use verikey_store::{CardKeyGuard, Store, StoreError};
use verikey_types::{CardKey, VerificationJob};

/// Default LMDB map size: 1 GiB, far above what card keys and jobs need.
const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// LMDB-backed store. Cheaply cloneable; clones share the environment.
#[derive(Clone)]
pub struct LmdbStore {
    pub(crate) env: Arc<Env>,
    pub(crate) card_keys: Database<Bytes, Bytes>,
    pub(crate) jobs: Database<Bytes, Bytes>,
    pub(crate) jobs_by_vid: Database<Bytes, Bytes>,
    pub(crate) jobs_order: Database<Bytes, Bytes>,
    pub(crate) daily_stats: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create the environment at `path` with the default map size.
    pub fn open(path: &Path) -> Result<Self, LmdbError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create data dir: {e}")))?;
        // SAFETY: each store opens its own directory exactly once; callers
        // share the environment through clones, never by reopening.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(8).open(path)? };

        let mut wtxn = env.write_txn()?;
        let card_keys = env.create_database(&mut wtxn, Some("card_keys"))?;
        let jobs = env.create_database(&mut wtxn, Some("jobs"))?;
        let jobs_by_vid = env.create_database(&mut wtxn, Some("jobs_by_vid"))?;
        let jobs_order = env.create_database(&mut wtxn, Some("jobs_order"))?;
        let daily_stats = env.create_database(&mut wtxn, Some("daily_stats"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), "opened LMDB store");

        Ok(Self {
            env: Arc::new(env),
            card_keys,
            jobs,
            jobs_by_vid,
            jobs_order,
            daily_stats,
        })
    }
}

impl Store for LmdbStore {
    fn lock_key_and_create_job(
        &self,
        guard: &CardKeyGuard,
        locked: &CardKey,
        job: &VerificationJob,
    ) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let matched = match self.card_keys.get(&wtxn, locked.code.as_bytes()) {
            Ok(Some(bytes)) => {
                let current: CardKey =
                    bincode::deserialize(bytes).map_err(LmdbError::from)?;
                guard.matches(&current)
            }
            Ok(None) => false,
            Err(e) => return Err(LmdbError::from(e).into()),
        };
        if !matched {
            // Dropping the uncommitted transaction discards everything.
            return Ok(false);
        }

        let key_bytes = bincode::serialize(locked).map_err(LmdbError::from)?;
        self.card_keys
            .put(&mut wtxn, locked.code.as_bytes(), &key_bytes)
            .map_err(LmdbError::from)?;

        job::insert_job_txn(self, &mut wtxn, job)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }
}
