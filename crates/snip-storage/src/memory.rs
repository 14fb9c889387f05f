use crate::index::UrlIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::{
    BatchEntry, ReadRepository, Repository, Result, ShortCode, StorageStats, UrlRecord,
};
use std::time::Duration;

/// Volatile in-process implementation of the repository contract.
///
/// All three index tables sit behind one reader/writer lock: reads share it,
/// every write holds it exclusively for the whole operation, so readers never
/// observe a half-applied insert or batch. State is lost when the process
/// exits.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    index: RwLock<UrlIndex>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<String>> {
        self.index.read().get(code)
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortCode>> {
        Ok(self.index.read().code_for(original_url))
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.index.read().list_by_owner(owner))
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(self.index.read().stats())
    }

    async fn health_check(&self, _deadline: Duration) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn put(&self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        self.index.write().insert(code, original_url, owner)
    }

    async fn put_batch(&self, entries: &[BatchEntry], owner: &str) -> Result<()> {
        let mut index = self.index.write();
        for entry in entries {
            index.insert(&entry.short_code, &entry.original_url, owner)?;
        }
        Ok(())
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &str) -> Result<()> {
        let mut index = self.index.write();
        for code in codes {
            index.tombstone(code, owner);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
