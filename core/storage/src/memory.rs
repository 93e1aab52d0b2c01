//! In-memory record store for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::filter::NameFilter;
use crate::store::RecordStore;
use credvault_common::{Error, RecordKey, Result};

/// In-memory record store.
///
/// Useful for testing. All data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error<T>(_: T) -> Error {
        Error::Storage("Memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, filters: &[String]) -> Result<Vec<RecordKey>> {
        let filter = NameFilter::new(filters)?;
        let records = self.records.read().map_err(Self::lock_error)?;
        Ok(records
            .keys()
            .filter(|k| filter.matches(k.name()))
            .cloned()
            .collect())
    }

    async fn read(&self, key: &RecordKey) -> Result<Vec<u8>> {
        let records = self.records.read().map_err(Self::lock_error)?;
        records
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Credential {} not found", key)))
    }

    async fn write(&self, key: &RecordKey, data: &[u8]) -> Result<()> {
        let mut records = self.records.write().map_err(Self::lock_error)?;
        records.insert(key.clone(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        let mut records = self.records.write().map_err(Self::lock_error)?;
        records
            .remove(key)
            .map(drop)
            .ok_or_else(|| Error::NotFound(format!("Credential {} not found", key)))
    }

    async fn exists(&self, key: &RecordKey) -> Result<bool> {
        let records = self.records.read().map_err(Self::lock_error)?;
        Ok(records.contains_key(key))
    }
}
