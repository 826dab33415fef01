//! Card key storage trait and the conditional-update guard.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use verikey_types::{CardKey, KeyStatus};

/// The previously observed state a conditional update compares against.
///
/// `used_count`/`max_uses` are optional so callers that only care about the
/// status transition (unlock, restore) can guard on status alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardKeyGuard {
    pub status: KeyStatus,
    pub used_count: Option<u32>,
    pub max_uses: Option<u32>,
}

impl CardKeyGuard {
    pub fn status(status: KeyStatus) -> Self {
        Self {
            status,
            used_count: None,
            max_uses: None,
        }
    }

    pub fn full(status: KeyStatus, used_count: u32, max_uses: u32) -> Self {
        Self {
            status,
            used_count: Some(used_count),
            max_uses: Some(max_uses),
        }
    }

    /// Whether a stored row still matches this guard.
    pub fn matches(&self, row: &CardKey) -> bool {
        row.status == self.status
            && self.used_count.is_none_or(|u| row.used_count == u)
            && self.max_uses.is_none_or(|m| row.max_uses == m)
    }
}

/// Trait for storing card keys.
pub trait CardKeyStore {
    /// Point lookup by code.
    fn get_key(&self, code: &str) -> Result<Option<CardKey>, StoreError>;

    /// Insert a freshly provisioned key. Fails with `Duplicate` if the code
    /// already exists.
    fn insert_key(&self, key: &CardKey) -> Result<(), StoreError>;

    /// Conditional replace: writes `new_row` (keyed by `new_row.code`) only
    /// if the stored row still matches `guard`. Returns `Ok(false)` when
    /// the row is missing or no longer matches — the race-lost signal.
    fn replace_key_if(&self, guard: &CardKeyGuard, new_row: &CardKey) -> Result<bool, StoreError>;

    /// All keys with the given status, or every key when `status` is None.
    /// Consumed by the admin collaborator only.
    fn list_keys(&self, status: Option<KeyStatus>) -> Result<Vec<CardKey>, StoreError>;
}
