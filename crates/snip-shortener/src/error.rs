use snip_core::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("short code has been deleted: {0}")]
    Gone(String),
    #[error("original url already shortened: {0}")]
    Conflict(String),
    #[error("short code already taken: {0}")]
    CodeCollision(String),
    #[error("conflicting url has no short code: {0}")]
    Inconsistent(String),
    #[error("deletion pipeline is closed")]
    PipelineClosed,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Deleted(code) => Self::Gone(code),
            StorageError::Conflict(url) => Self::Conflict(url),
            StorageError::CodeCollision(code) => Self::CodeCollision(code),
            other => Self::Storage(other),
        }
    }
}
