//! The card key — a finite-use access code gating verification attempts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::Timestamp;

/// Lifecycle state of a card key.
///
/// Serialized in SCREAMING_SNAKE_CASE to match the wire/admin representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// Available for locking (may still have uses left on a multi-use key).
    Unused,
    /// Exclusively held by one in-flight verification job.
    Locked,
    /// All uses spent; terminal unless an admin restores it.
    Consumed,
    /// Withdrawn by an admin.
    Revoked,
    /// Validity window passed; never lockable again.
    Expired,
}

impl KeyStatus {
    /// Whether a lock attempt can ever succeed from this state.
    pub fn is_lockable(&self) -> bool {
        matches!(self, Self::Unused)
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unused => "UNUSED",
            Self::Locked => "LOCKED",
            Self::Consumed => "CONSUMED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// A finite-use access code.
///
/// Invariants maintained by the resource manager:
/// - `status == Locked` implies `lock_job_id.is_some()`
/// - `status == Consumed` implies `used_count == max_uses`
/// - `0 <= used_count <= max_uses`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardKey {
    /// Opaque unique code (primary key).
    pub code: String,
    pub status: KeyStatus,
    pub max_uses: u32,
    pub used_count: u32,
    /// Set together with `lock_job_id` when `Locked`; both cleared on any
    /// exit from `Locked`.
    pub locked_at: Option<Timestamp>,
    pub lock_job_id: Option<String>,
    pub expires_at: Option<Timestamp>,
    /// Set exactly when `used_count` reaches `max_uses`.
    pub consumed_at: Option<Timestamp>,
    /// Provisioning batch label, if any.
    pub batch_no: Option<String>,
    pub note: Option<String>,
    pub created_at: Timestamp,
}

impl CardKey {
    /// A fresh, unused key. Provisioning metadata can be filled in afterwards.
    pub fn new(code: impl Into<String>, max_uses: u32, created_at: Timestamp) -> Self {
        Self {
            code: code.into(),
            status: KeyStatus::Unused,
            max_uses,
            used_count: 0,
            locked_at: None,
            lock_job_id: None,
            expires_at: None,
            consumed_at: None,
            batch_no: None,
            note: None,
            created_at,
        }
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_batch_no(mut self, batch_no: impl Into<String>) -> Self {
        self.batch_no = Some(batch_no.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Whether the validity window has passed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|e| e.is_before(now))
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.used_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_is_unused_with_full_allowance() {
        let key = CardKey::new("k1", 3, Timestamp::new(0));
        assert_eq!(key.status, KeyStatus::Unused);
        assert_eq!(key.remaining_uses(), 3);
        assert!(key.lock_job_id.is_none());
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let key = CardKey::new("k1", 1, Timestamp::new(0)).with_expiry(Timestamp::new(100));
        assert!(!key.is_expired(Timestamp::new(100)));
        assert!(key.is_expired(Timestamp::new(101)));
    }

    #[test]
    fn keys_without_expiry_never_expire() {
        let key = CardKey::new("k1", 1, Timestamp::new(0));
        assert!(!key.is_expired(Timestamp::new(u64::MAX)));
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&KeyStatus::Unused).unwrap();
        assert_eq!(json, "\"UNUSED\"");
        let back: KeyStatus = serde_json::from_str("\"REVOKED\"").unwrap();
        assert_eq!(back, KeyStatus::Revoked);
    }
}
