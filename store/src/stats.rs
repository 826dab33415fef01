//! Daily statistics storage trait.

use crate::StoreError;
use verikey_types::DailyStats;

/// Trait for the daily success/fail counters.
pub trait StatsStore {
    /// Upsert-increment the counters for `date` ("YYYY-MM-DD").
    fn bump_daily(&self, date: &str, success: bool) -> Result<(), StoreError>;

    fn get_daily(&self, date: &str) -> Result<Option<DailyStats>, StoreError>;
}
