//! Card key resource manager.
//!
//! Every mutation is a single conditional update keyed on the previously
//! observed row (`status`, and for locking also `used_count`/`max_uses`).
//! A losing concurrent caller observes zero rows affected — `Ok(false)`
//! from the store — rather than corrupting state, which gives at-most-one-
//! winner semantics for concurrent `lock` calls without holding any
//! database lock across the verification's lifetime.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use verikey_store::{CardKeyGuard, Store};
use verikey_types::{CardKey, KeyStatus, Timestamp, VerificationJob};

use crate::VerifyError;

/// Domain errors for card key operations. All safe to show to end users.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("card key not found")]
    NotFound,

    #[error("card key has expired")]
    Expired,

    #[error("card key is unavailable or already locked")]
    Unavailable,

    #[error("card key is fully consumed")]
    Exhausted,

    #[error("card key is not locked")]
    NotLocked,

    #[error("only revoked card keys can be restored")]
    NotRevoked,
}

/// Manages card key state transitions against the store.
#[derive(Clone)]
pub struct KeyManager {
    store: Arc<dyn Store>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Raw lookup, for the admin collaborator and result queries.
    pub fn get(&self, code: &str) -> Result<Option<CardKey>, VerifyError> {
        Ok(self.store.get_key(code)?)
    }

    /// Acquire the key exclusively for `job_id`.
    pub fn lock(&self, code: &str, job_id: &str) -> Result<(), VerifyError> {
        let (guard, locked) = self.prepare_lock(code, job_id)?;
        if self.store.replace_key_if(&guard, &locked)? {
            debug!(code, job_id, "card key locked");
            Ok(())
        } else {
            Err(KeyError::Unavailable.into())
        }
    }

    /// Acquire the key and create its job in one store transaction: either
    /// both happen or neither does.
    pub fn lock_and_create_job(&self, job: &VerificationJob) -> Result<(), VerifyError> {
        let (guard, locked) = self.prepare_lock(&job.card_key_code, &job.id)?;
        if self.store.lock_key_and_create_job(&guard, &locked, job)? {
            debug!(code = %job.card_key_code, job_id = %job.id, "card key locked, job created");
            Ok(())
        } else {
            Err(KeyError::Unavailable.into())
        }
    }

    /// Charge one use and release the lock. Reaching `max_uses` makes the
    /// key `Consumed`; otherwise it returns to `Unused` for its remaining
    /// uses.
    pub fn consume(&self, code: &str) -> Result<(), VerifyError> {
        let Some(key) = self.store.get_key(code)? else {
            return Err(KeyError::NotLocked.into());
        };
        if key.status != KeyStatus::Locked {
            return Err(KeyError::NotLocked.into());
        }

        let next_used = key.used_count + 1;
        let fully_consumed = next_used >= key.max_uses;
        let mut row = key;
        row.used_count = next_used;
        row.status = if fully_consumed {
            KeyStatus::Consumed
        } else {
            KeyStatus::Unused
        };
        row.consumed_at = fully_consumed.then(Timestamp::now);
        row.locked_at = None;
        row.lock_job_id = None;

        let guard = CardKeyGuard::status(KeyStatus::Locked);
        if self.store.replace_key_if(&guard, &row)? {
            debug!(code, used = next_used, fully_consumed, "card key consumed");
            Ok(())
        } else {
            Err(KeyError::NotLocked.into())
        }
    }

    /// Release the lock without charging a use. The rollback path for
    /// every non-success settlement.
    pub fn unlock(&self, code: &str) -> Result<(), VerifyError> {
        let Some(key) = self.store.get_key(code)? else {
            return Err(KeyError::NotLocked.into());
        };
        if key.status != KeyStatus::Locked {
            return Err(KeyError::NotLocked.into());
        }

        let mut row = key;
        row.status = KeyStatus::Unused;
        row.locked_at = None;
        row.lock_job_id = None;

        let guard = CardKeyGuard::status(KeyStatus::Locked);
        if self.store.replace_key_if(&guard, &row)? {
            debug!(code, "card key unlocked");
            Ok(())
        } else {
            Err(KeyError::NotLocked.into())
        }
    }

    /// Withdraw a key. Admin operation; not used by the orchestrator.
    pub fn revoke(&self, code: &str) -> Result<(), VerifyError> {
        let Some(key) = self.store.get_key(code)? else {
            return Err(KeyError::NotFound.into());
        };
        let guard = CardKeyGuard::status(key.status);
        let mut row = key;
        row.status = KeyStatus::Revoked;
        row.locked_at = None;
        row.lock_job_id = None;
        if self.store.replace_key_if(&guard, &row)? {
            Ok(())
        } else {
            Err(KeyError::Unavailable.into())
        }
    }

    /// Bring a revoked key back into service. Conditional on the key still
    /// being revoked; remaining uses are preserved.
    pub fn restore(&self, code: &str) -> Result<(), VerifyError> {
        let Some(key) = self.store.get_key(code)? else {
            return Err(KeyError::NotFound.into());
        };
        let guard = CardKeyGuard::status(KeyStatus::Revoked);
        let mut row = key;
        row.status = KeyStatus::Unused;
        row.consumed_at = None;
        row.locked_at = None;
        row.lock_job_id = None;
        if self.store.replace_key_if(&guard, &row)? {
            Ok(())
        } else {
            Err(KeyError::NotRevoked.into())
        }
    }

    /// Eligibility checks plus the guard/row pair for the lock CAS.
    fn prepare_lock(
        &self,
        code: &str,
        job_id: &str,
    ) -> Result<(CardKeyGuard, CardKey), VerifyError> {
        let Some(key) = self.store.get_key(code)? else {
            return Err(KeyError::NotFound.into());
        };

        if key.is_expired(Timestamp::now()) {
            // Flip the row to Expired so later attempts fail fast. Losing
            // this CAS changes nothing — the attempt fails either way.
            let guard = CardKeyGuard::status(key.status);
            let mut expired = key;
            expired.status = KeyStatus::Expired;
            expired.locked_at = None;
            expired.lock_job_id = None;
            let _ = self.store.replace_key_if(&guard, &expired)?;
            return Err(KeyError::Expired.into());
        }
        if key.status != KeyStatus::Unused {
            return Err(KeyError::Unavailable.into());
        }
        if key.used_count >= key.max_uses {
            return Err(KeyError::Exhausted.into());
        }

        let guard = CardKeyGuard::full(KeyStatus::Unused, key.used_count, key.max_uses);
        let mut locked = key;
        locked.status = KeyStatus::Locked;
        locked.locked_at = Some(Timestamp::now());
        locked.lock_job_id = Some(job_id.to_string());
        Ok((guard, locked))
    }
}
