use snip_core::{Result, ShortCode, StorageError, StorageStats, UrlRecord};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner: String,
    deleted: bool,
}

/// The three lookup tables shared by the in-process backends.
///
/// Not synchronized: callers wrap it in a single lock so that all three
/// tables change together.
#[derive(Debug, Default)]
pub(crate) struct UrlIndex {
    by_code: HashMap<ShortCode, Entry>,
    by_url: HashMap<String, ShortCode>,
    by_owner: HashMap<String, Vec<ShortCode>>,
}

impl UrlIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, code: &ShortCode) -> Result<Option<String>> {
        match self.by_code.get(code) {
            None => Ok(None),
            Some(entry) if entry.deleted => Err(StorageError::Deleted(code.to_string())),
            Some(entry) => Ok(Some(entry.original_url.clone())),
        }
    }

    pub(crate) fn code_for(&self, original_url: &str) -> Option<ShortCode> {
        self.by_url.get(original_url).cloned()
    }

    #[cfg(test)]
    pub(crate) fn owner_of(&self, code: &ShortCode) -> Option<&str> {
        self.by_code.get(code).map(|entry| entry.owner.as_str())
    }

    pub(crate) fn list_by_owner(&self, owner: &str) -> Vec<UrlRecord> {
        let Some(codes) = self.by_owner.get(owner) else {
            return Vec::new();
        };

        codes
            .iter()
            .filter_map(|code| {
                self.by_code.get(code).map(|entry| UrlRecord {
                    short_code: code.clone(),
                    original_url: entry.original_url.clone(),
                    owner: entry.owner.clone(),
                    deleted: entry.deleted,
                })
            })
            .collect()
    }

    pub(crate) fn stats(&self) -> StorageStats {
        StorageStats {
            urls: self.by_code.len(),
            users: self
                .by_owner
                .keys()
                .filter(|owner| !owner.is_empty())
                .count(),
        }
    }

    /// Checks that `code` and `original_url` are both still free.
    pub(crate) fn check_insert(&self, code: &ShortCode, original_url: &str) -> Result<()> {
        if self.by_url.contains_key(original_url) {
            return Err(StorageError::Conflict(original_url.to_owned()));
        }
        if self.by_code.contains_key(code) {
            return Err(StorageError::CodeCollision(code.to_string()));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        self.check_insert(code, original_url)?;

        self.by_code.insert(
            code.clone(),
            Entry {
                original_url: original_url.to_owned(),
                owner: owner.to_owned(),
                deleted: false,
            },
        );
        self.by_url.insert(original_url.to_owned(), code.clone());
        self.by_owner
            .entry(owner.to_owned())
            .or_default()
            .push(code.clone());
        Ok(())
    }

    /// Whether tombstoning `code` on behalf of `owner` would change anything.
    pub(crate) fn can_tombstone(&self, code: &ShortCode, owner: &str) -> bool {
        self.by_code
            .get(code)
            .is_some_and(|entry| entry.owner == owner && !entry.deleted)
    }

    /// Sets the tombstone flag. Returns `true` if the record changed state.
    pub(crate) fn tombstone(&mut self, code: &ShortCode, owner: &str) -> bool {
        match self.by_code.get_mut(code) {
            Some(entry) if entry.owner == owner && !entry.deleted => {
                entry.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// The stored URL of a record, regardless of its tombstone.
    pub(crate) fn original_url(&self, code: &ShortCode) -> Option<&str> {
        self.by_code.get(code).map(|entry| entry.original_url.as_str())
    }

    pub(crate) fn len(&self) -> usize {
        self.by_code.len()
    }
}
