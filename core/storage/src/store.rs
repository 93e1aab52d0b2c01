//! Record store trait definition.

use async_trait::async_trait;

use credvault_common::{RecordKey, Result};

/// Storage backend for encrypted records.
///
/// Values are opaque to the store. Implementations provide no locking: two
/// writers racing on the same key is out of contract.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get the store name (e.g., "directory", "memory").
    fn name(&self) -> &str;

    /// Enumerate records whose name matches any of `filters`.
    ///
    /// Filters are unanchored regular expressions; an empty slice matches
    /// every record.
    ///
    /// # Postconditions
    /// - Keys are sorted by name, then type
    ///
    /// # Errors
    /// - `InvalidInput` if a filter is not a valid pattern
    /// - `Parse` if a stored entry is malformed; the whole listing fails
    async fn list(&self, filters: &[String]) -> Result<Vec<RecordKey>>;

    /// Read the blob stored under `key`.
    ///
    /// # Errors
    /// - `NotFound` if no record exists for the key
    async fn read(&self, key: &RecordKey) -> Result<Vec<u8>>;

    /// Store `data` under `key`, replacing any previous value.
    ///
    /// # Postconditions
    /// - A later `read` of the same key returns exactly `data`
    /// - Readers never observe a partially written value
    async fn write(&self, key: &RecordKey, data: &[u8]) -> Result<()>;

    /// Remove the record stored under `key`.
    ///
    /// # Errors
    /// - `NotFound` if no record exists for the key
    async fn delete(&self, key: &RecordKey) -> Result<()>;

    /// Check whether a record exists.
    async fn exists(&self, key: &RecordKey) -> Result<bool>;
}
