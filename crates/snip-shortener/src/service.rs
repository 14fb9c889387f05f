use crate::deletion::{DeletionConfig, DeletionPipeline};
use crate::{Result, ShortenerError};
use serde::{Deserialize, Serialize};
use snip_core::{BatchEntry, Repository, ShortCode, StorageError, StorageStats};
use snip_generator::Generator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Prefix prepended to every short code when rendering short links.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub deletion: DeletionConfig,
    /// Deadline handed to the repository health check by [`ShortenerService::ping`].
    #[builder(default = DEFAULT_HEALTH_TIMEOUT)]
    pub health_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Outcome of [`ShortenerService::shorten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    Created(String),
    /// The URL had been shortened before; carries the existing short link.
    Existing(String),
}

impl Shortened {
    pub fn url(&self) -> &str {
        match self {
            Shortened::Created(url) | Shortened::Existing(url) => url,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Shortened::Existing(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequestItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Request-layer facade over a [`Repository`] and a [`Generator`].
///
/// Codes come from the generator as-is. A generated code that is already
/// taken surfaces as [`ShortenerError::CodeCollision`]; there is no retry.
/// Deletions go through a [`DeletionPipeline`] started with the service.
pub struct ShortenerService<R: ?Sized, G> {
    repository: Arc<R>,
    generator: G,
    deletions: DeletionPipeline,
    base_url: String,
    health_timeout: Duration,
}

impl<R: ?Sized, G> std::fmt::Debug for ShortenerService<R, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortenerService")
            .field("base_url", &self.base_url)
            .field("deletions", &self.deletions)
            .finish_non_exhaustive()
    }
}

impl<R, G> ShortenerService<R, G>
where
    R: Repository + ?Sized,
    G: Generator,
{
    /// Creates the service and starts its deletion workers. Must be called
    /// from within a tokio runtime.
    pub fn new(repository: Arc<R>, generator: G, config: ServiceConfig) -> Self {
        let deletions = DeletionPipeline::start(Arc::clone(&repository), config.deletion);
        Self {
            repository,
            generator,
            deletions,
            base_url: config.base_url,
            health_timeout: config.health_timeout,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn deletions(&self) -> &DeletionPipeline {
        &self.deletions
    }

    fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }

    pub async fn shorten(&self, original_url: &str, owner: &str) -> Result<Shortened> {
        let code = self.generator.generate();

        match self.repository.put(&code, original_url, owner).await {
            Ok(()) => {
                debug!(code = %code, owner = %owner, "shortened url");
                Ok(Shortened::Created(self.short_url(&code)))
            }
            Err(StorageError::Conflict(_)) => {
                let existing = self
                    .repository
                    .get_by_original_url(original_url)
                    .await?
                    .ok_or_else(|| ShortenerError::Inconsistent(original_url.to_owned()))?;
                debug!(code = %existing, "url already shortened");
                Ok(Shortened::Existing(self.short_url(&existing)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Shortens every item under one owner. Atomicity follows the backend:
    /// the database keeps all or nothing, the others keep the items before a
    /// failing one.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchRequestItem>,
        owner: &str,
    ) -> Result<Vec<BatchResponseItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(items.len());
        let mut response = Vec::with_capacity(items.len());
        for item in items {
            let code = self.generator.generate();
            response.push(BatchResponseItem {
                correlation_id: item.correlation_id,
                short_url: self.short_url(&code),
            });
            entries.push(BatchEntry::new(code, item.original_url));
        }

        self.repository.put_batch(&entries, owner).await?;
        debug!(owner = %owner, items = entries.len(), "shortened batch");
        Ok(response)
    }

    /// Returns the original URL, `None` for unknown codes and
    /// [`ShortenerError::Gone`] for deleted ones.
    pub async fn resolve(&self, code: &ShortCode) -> Result<Option<String>> {
        Ok(self.repository.get(code).await?)
    }

    pub async fn user_urls(&self, owner: &str) -> Result<Vec<UserUrl>> {
        let records = self.repository.list_by_owner(owner).await?;
        Ok(records
            .into_iter()
            .map(|record| UserUrl {
                short_url: self.short_url(&record.short_code),
                original_url: record.original_url,
            })
            .collect())
    }

    /// Queues the codes for deletion and returns without waiting for them to
    /// be applied. Codes the owner does not own are ignored by the workers.
    pub async fn delete_urls(&self, codes: Vec<ShortCode>, owner: &str) -> Result<()> {
        self.deletions.accept(owner, codes).await
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.repository.health_check(self.health_timeout).await?)
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(self.repository.stats().await?)
    }

    /// Stops the deletion workers, dropping queued requests, then shuts the
    /// repository down.
    pub async fn shutdown(&self) -> Result<()> {
        self.deletions.shutdown().await;
        self.repository.shutdown().await?;
        info!("shortener service stopped");
        Ok(())
    }

    /// Like [`shutdown`](Self::shutdown) but applies every queued deletion first.
    pub async fn drain(&self) -> Result<()> {
        self.deletions.drain().await;
        self.repository.shutdown().await?;
        info!("shortener service stopped");
        Ok(())
    }
}
