use crate::{FileRepository, InMemoryRepository, SqliteRepository};
use snip_core::{Repository, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Which backend a [`StorageConfig`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File(PathBuf),
    Database(String),
}

impl BackendKind {
    /// Short label for logs. Never includes the DSN, which may carry credentials.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::File(_) => "file",
            BackendKind::Database(_) => "database",
        }
    }
}

/// Storage settings handed over by the process configuration layer.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
}

impl StorageConfig {
    /// A non-empty DSN wins over a non-empty file path; with neither set the
    /// volatile memory backend is used.
    pub fn backend(&self) -> BackendKind {
        if let Some(dsn) = self.database_dsn.as_ref().filter(|dsn| !dsn.is_empty()) {
            return BackendKind::Database(dsn.clone());
        }
        if let Some(path) = self
            .file_storage_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return BackendKind::File(path.clone());
        }
        BackendKind::Memory
    }
}

/// Builds the backend selected by `config`.
///
/// For the database backend this also runs migrations; an error here is
/// meant to abort startup.
pub async fn open_repository(config: &StorageConfig) -> Result<Arc<dyn Repository>> {
    let repository: Arc<dyn Repository> = match config.backend() {
        BackendKind::Database(dsn) => {
            info!("using database storage");
            Arc::new(SqliteRepository::connect(&dsn).await?)
        }
        BackendKind::File(path) => {
            info!(path = %path.display(), "using file storage");
            Arc::new(FileRepository::open(path)?)
        }
        BackendKind::Memory => {
            info!("using in-memory storage");
            Arc::new(InMemoryRepository::new())
        }
    };
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory() {
        assert_eq!(StorageConfig::default().backend(), BackendKind::Memory);
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = StorageConfig {
            file_storage_path: Some(PathBuf::new()),
            database_dsn: Some(String::new()),
        };
        assert_eq!(config.backend(), BackendKind::Memory);
    }

    #[test]
    fn dsn_takes_precedence_over_file() {
        let config = StorageConfig {
            file_storage_path: Some(PathBuf::from("links.json")),
            database_dsn: Some("sqlite://links.db".into()),
        };
        assert_eq!(
            config.backend(),
            BackendKind::Database("sqlite://links.db".into())
        );
    }

    #[test]
    fn file_path_selects_file_backend() {
        let config = StorageConfig {
            file_storage_path: Some(PathBuf::from("links.json")),
            database_dsn: None,
        };
        assert_eq!(config.backend(), BackendKind::File("links.json".into()));
    }

    #[tokio::test]
    async fn opens_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            file_storage_path: Some(dir.path().join("links.json")),
            database_dsn: None,
        };

        let repository = open_repository(&config).await.unwrap();
        repository
            .put(&"abcdefgh".into(), "http://some.ru/123", "")
            .await
            .unwrap();
        assert!(dir.path().join("links.json").exists());
    }
}
