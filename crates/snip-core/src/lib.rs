//! Core types and traits for the snip URL shortener.
//!
//! This crate holds the record model, the error taxonomy and the storage
//! contract shared by every backend and by the shortener service.

pub mod error;
pub mod repository;
pub mod shortcode;

pub use error::{Result, StorageError};
pub use repository::{BatchEntry, ReadRepository, Repository, StorageStats, UrlRecord};
pub use shortcode::{ShortCode, KEY_LENGTH};
