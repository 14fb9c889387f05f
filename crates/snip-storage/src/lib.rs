//! Storage backends for the snip URL shortener.
//!
//! Three interchangeable implementations of [`Repository`]:
//! [`InMemoryRepository`] (volatile), [`FileRepository`] (in-memory index
//! backed by an append-only JSON lines log) and [`SqliteRepository`]
//! (relational table). [`open_repository`] picks one from a [`StorageConfig`].

pub mod config;
pub mod file;
mod index;
pub mod memory;
pub mod sqlite;

pub use config::{open_repository, BackendKind, StorageConfig};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use snip_core::{
    BatchEntry, ReadRepository, Repository, Result, ShortCode, StorageError, StorageStats,
    UrlRecord,
};
pub use sqlite::SqliteRepository;
