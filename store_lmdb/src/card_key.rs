//! LMDB implementation of CardKeyStore.

use verikey_store::{CardKeyGuard, CardKeyStore, StoreError};
use verikey_types::{CardKey, KeyStatus};

use crate::{LmdbError, LmdbStore};

impl CardKeyStore for LmdbStore {
    fn get_key(&self, code: &str) -> Result<Option<CardKey>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .card_keys
            .get(&rtxn, code.as_bytes())
            .map_err(LmdbError::from)?;
        match val {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn insert_key(&self, key: &CardKey) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .card_keys
            .get(&wtxn, key.code.as_bytes())
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("card key '{}'", key.code)));
        }
        let bytes = bincode::serialize(key).map_err(LmdbError::from)?;
        self.card_keys
            .put(&mut wtxn, key.code.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn replace_key_if(&self, guard: &CardKeyGuard, new_row: &CardKey) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let matched = match self
            .card_keys
            .get(&wtxn, new_row.code.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => {
                let current: CardKey = bincode::deserialize(bytes).map_err(LmdbError::from)?;
                guard.matches(&current)
            }
            None => false,
        };
        if !matched {
            return Ok(false);
        }
        let bytes = bincode::serialize(new_row).map_err(LmdbError::from)?;
        self.card_keys
            .put(&mut wtxn, new_row.code.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn list_keys(&self, status: Option<KeyStatus>) -> Result<Vec<CardKey>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.card_keys.iter(&rtxn).map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter {
            let (_code, bytes) = entry.map_err(LmdbError::from)?;
            let key: CardKey = bincode::deserialize(bytes).map_err(LmdbError::from)?;
            if status.is_none_or(|s| key.status == s) {
                results.push(key);
            }
        }
        Ok(results)
    }
}
