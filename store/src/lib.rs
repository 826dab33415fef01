//! Abstract storage traits for the verikey verification pipeline.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits. The one
//! correctness-critical primitive is [`CardKeyStore::replace_key_if`]: a
//! conditional update keyed on the previously observed row state, where
//! "zero rows affected" (`Ok(false)`) is the race-lost signal rather than
//! an error.

pub mod card_key;
pub mod error;
pub mod job;
pub mod memory;
pub mod stats;

pub use card_key::{CardKeyGuard, CardKeyStore};
pub use error::StoreError;
pub use job::JobStore;
pub use memory::MemoryStore;
pub use stats::StatsStore;

use verikey_types::{CardKey, VerificationJob};

/// The aggregate storage interface the orchestrator holds.
///
/// `lock_key_and_create_job` is the single cross-record atomic operation:
/// the conditional card-key lock and the job insert either both happen or
/// neither does. Backends scope it with whatever transaction primitive they
/// have (one LMDB write transaction, one mutex critical section).
pub trait Store: CardKeyStore + JobStore + StatsStore + Send + Sync {
    /// Atomically apply the lock CAS and insert the job row.
    ///
    /// Returns `Ok(false)` without inserting the job when the guard no
    /// longer matches (another caller won the race).
    fn lock_key_and_create_job(
        &self,
        guard: &CardKeyGuard,
        locked: &CardKey,
        job: &VerificationJob,
    ) -> Result<bool, StoreError>;
}
