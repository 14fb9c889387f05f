use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors returned by every storage backend.
///
/// A missing key is not an error: lookups return `Ok(None)` for codes that
/// never existed. `Deleted`, `Conflict` and `CodeCollision` are expected
/// outcomes the caller resolves; the remaining variants are failures of the
/// underlying substrate.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code has been deleted: {0}")]
    Deleted(String),
    #[error("original url already shortened: {0}")]
    Conflict(String),
    #[error("short code already taken: {0}")]
    CodeCollision(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage i/o failed during {op}: {message}")]
    Io { op: &'static str, message: String },
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    pub fn io(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            op,
            message: err.to_string(),
        }
    }

    /// Whether the error comes from the substrate rather than from the data.
    ///
    /// Transient failures may succeed on retry; `Deleted`, `Conflict` and
    /// `CodeCollision` will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::Timeout(_)
                | Self::Io { .. }
                | Self::Query(_)
                | Self::InvalidData(_)
        )
    }
}
