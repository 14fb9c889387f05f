use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored mapping from short code to original URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_code: ShortCode,
    pub original_url: String,
    /// Creator of the record; empty for anonymous records.
    pub owner: String,
    /// Tombstone flag. Only ever goes from `false` to `true`.
    pub deleted: bool,
}

/// One item of a batch insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub short_code: ShortCode,
    pub original_url: String,
}

impl BatchEntry {
    pub fn new(short_code: impl Into<ShortCode>, original_url: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            original_url: original_url.into(),
        }
    }
}

/// Counters reported by [`ReadRepository::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Number of stored records, tombstoned ones included.
    pub urls: usize,
    /// Number of distinct non-anonymous owners.
    pub users: usize,
}

/// The read half of the storage contract.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Looks up the original URL for a short code.
    ///
    /// Returns `Ok(None)` if the code never existed and
    /// `Err(StorageError::Deleted)` if the record is tombstoned.
    async fn get(&self, code: &ShortCode) -> Result<Option<String>>;

    /// Finds the code an original URL is already stored under.
    ///
    /// No ownership filtering is applied and tombstoned records still match.
    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortCode>>;

    /// Lists every record created by `owner`, tombstoned ones included.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlRecord>>;

    async fn stats(&self) -> Result<StorageStats>;

    /// Probes the backend without side effects.
    ///
    /// Network-bound backends must answer within `deadline`; in-process
    /// backends return immediately.
    async fn health_check(&self, deadline: Duration) -> Result<()>;
}

/// The full storage contract implemented by every backend.
#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new record.
    ///
    /// Fails with `Conflict` if `original_url` is already mapped to any code
    /// and with `CodeCollision` if `code` is already taken.
    async fn put(&self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()>;

    /// Inserts many records for one owner in a single call.
    ///
    /// Whether a failing item rolls back the items before it depends on the
    /// backend: the database backend is all-or-nothing, the in-process
    /// backends keep what was applied before the failure.
    async fn put_batch(&self, entries: &[BatchEntry], owner: &str) -> Result<()>;

    /// Tombstones the records among `codes` that belong to `owner`.
    ///
    /// Codes that are absent or owned by someone else are skipped silently.
    /// Tombstoning an already deleted record is a no-op.
    async fn mark_deleted(&self, codes: &[ShortCode], owner: &str) -> Result<()>;

    /// Releases the backend's resources.
    async fn shutdown(&self) -> Result<()>;
}
