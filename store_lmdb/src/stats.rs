//! LMDB implementation of StatsStore.

use verikey_store::{StatsStore, StoreError};
use verikey_types::DailyStats;

use crate::{LmdbError, LmdbStore};

impl StatsStore for LmdbStore {
    fn bump_daily(&self, date: &str, success: bool) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut stats: DailyStats = match self
            .daily_stats
            .get(&wtxn, date.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => bincode::deserialize(bytes).map_err(LmdbError::from)?,
            None => DailyStats::new(date),
        };
        stats.record(success);
        let encoded = bincode::serialize(&stats).map_err(LmdbError::from)?;
        self.daily_stats
            .put(&mut wtxn, date.as_bytes(), &encoded)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_daily(&self, date: &str) -> Result<Option<DailyStats>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .daily_stats
            .get(&rtxn, date.as_bytes())
            .map_err(LmdbError::from)?;
        match val {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }
}
