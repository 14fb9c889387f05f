//! URL shortener service built on the snip storage backends.
//!
//! [`ShortenerService`] is the facade the request layer talks to: creation,
//! lookup and listing go straight to the repository, deletions are handed
//! to the asynchronous [`DeletionPipeline`].

pub mod deletion;
pub mod error;
pub mod service;

pub use deletion::{DeletionConfig, DeletionPipeline, DeletionRequest};
pub use error::{Result, ShortenerError};
pub use service::{
    BatchRequestItem, BatchResponseItem, ServiceConfig, Shortened, ShortenerService, UserUrl,
};
