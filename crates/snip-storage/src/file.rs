use crate::index::UrlIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snip_core::{
    BatchEntry, ReadRepository, Repository, Result, ShortCode, StorageError, StorageStats,
    UrlRecord,
};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One line of the append-only log.
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    short_url: String,
    original_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    user_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_deleted: bool,
}

impl LogEntry {
    fn record(code: &ShortCode, original_url: &str, owner: &str) -> Self {
        Self {
            short_url: code.to_string(),
            original_url: original_url.to_owned(),
            user_id: owner.to_owned(),
            is_deleted: false,
        }
    }

    fn tombstone(code: &ShortCode, original_url: &str, owner: &str) -> Self {
        Self {
            is_deleted: true,
            ..Self::record(code, original_url, owner)
        }
    }
}

/// Append target of the log.
trait LogSink: Write {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, size: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)
    }
}

/// Writes one line. A partial write is cut back so the log always ends on a
/// line boundary.
fn append_line<L: LogSink>(log: &mut L, line: &[u8]) -> Result<()> {
    let size = log.size().map_err(|e| StorageError::io("append", e))?;
    if let Err(err) = log.write_all(line) {
        if let Err(truncate_err) = log.truncate(size) {
            error!(error = %truncate_err, size, "failed to cut back partial log line");
        }
        return Err(StorageError::io("append", err));
    }
    Ok(())
}

struct FileState {
    index: UrlIndex,
    log: File,
}

impl FileState {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| StorageError::InvalidData(format!("encode log line: {e}")))?;
        line.push(b'\n');
        append_line(&mut self.log, &line)
    }

    /// Appends the record, then indexes it. Nothing changes if either fails.
    fn insert(&mut self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        self.index.check_insert(code, original_url)?;
        self.append(&LogEntry::record(code, original_url, owner))?;
        self.index.insert(code, original_url, owner)
    }
}

/// Repository backed by a newline-delimited JSON log.
///
/// The log is replayed into an in-memory index on open. Writes append one
/// line per record under the same exclusive lock that updates the index, so
/// log order always matches index update order. Appends are not synced: a
/// crash can lose the most recent lines even though the running process had
/// already indexed them. Tombstones are appended as the record with
/// `"is_deleted": true`.
pub struct FileRepository {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl std::fmt::Debug for FileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileRepository {
    /// Opens the log at `path`, creating it if missing, and replays it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| StorageError::io("open", e))?;

        let index = replay(BufReader::new(&log))?;
        info!(
            path = %path.display(),
            records = index.len(),
            "replayed storage file"
        );

        Ok(Self {
            path,
            state: RwLock::new(FileState { index, log }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Rebuilds the index from log lines.
///
/// The first occurrence of a short code or original URL wins; later
/// duplicates are logged and skipped. A tombstone line marks the record of
/// the same owner as deleted.
fn replay<R: BufRead>(reader: R) -> Result<UrlIndex> {
    let mut index = UrlIndex::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StorageError::io("replay", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: LogEntry = serde_json::from_str(line).map_err(|e| {
            StorageError::InvalidData(format!("log line {}: {e}", number + 1))
        })?;
        let code = ShortCode::new(entry.short_url);

        if entry.is_deleted {
            if !index.tombstone(&code, &entry.user_id) {
                debug!(code = %code, owner = %entry.user_id, "ignoring tombstone for unknown record");
            }
            continue;
        }

        match index.insert(&code, &entry.original_url, &entry.user_id) {
            Ok(()) => {}
            Err(StorageError::CodeCollision(_)) => {
                warn!(code = %code, original_url = %entry.original_url, "duplicate short code in storage file");
            }
            Err(StorageError::Conflict(_)) => {
                warn!(code = %code, original_url = %entry.original_url, "duplicate original url in storage file");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(index)
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<String>> {
        self.state.read().index.get(code)
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortCode>> {
        Ok(self.state.read().index.code_for(original_url))
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.state.read().index.list_by_owner(owner))
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(self.state.read().index.stats())
    }

    async fn health_check(&self, _deadline: Duration) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn put(&self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        self.state.write().insert(code, original_url, owner)
    }

    async fn put_batch(&self, entries: &[BatchEntry], owner: &str) -> Result<()> {
        let mut state = self.state.write();
        for entry in entries {
            state.insert(&entry.short_code, &entry.original_url, owner)?;
        }
        Ok(())
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &str) -> Result<()> {
        let mut state = self.state.write();
        for code in codes {
            if !state.index.can_tombstone(code, owner) {
                continue;
            }
            let original_url = state.index.original_url(code).unwrap_or_default().to_owned();
            state.append(&LogEntry::tombstone(code, &original_url, owner))?;
            state.index.tombstone(code, owner);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.write();
        state.log.flush().map_err(|e| StorageError::io("flush", e))?;
        state.log.sync_all().map_err(|e| StorageError::io("sync", e))
    }
}
