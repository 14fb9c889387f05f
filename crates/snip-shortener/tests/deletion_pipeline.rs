use async_trait::async_trait;
use snip_core::{
    BatchEntry, ReadRepository, Repository, Result, ShortCode, StorageError, StorageStats,
    UrlRecord,
};
use snip_shortener::{DeletionConfig, DeletionPipeline, ShortenerError};
use snip_storage::{FileRepository, InMemoryRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Memory repository whose `mark_deleted` waits for a permit, so tests can
/// hold a worker in the middle of a request.
struct GatedRepository {
    inner: InMemoryRepository,
    gate: Semaphore,
    calls: AtomicUsize,
    fail: bool,
}

impl GatedRepository {
    fn closed() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            fail: true,
            ..Self::closed()
        }
    }

    fn open_gate(&self) {
        self.gate.add_permits(1000);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadRepository for GatedRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<String>> {
        self.inner.get(code).await
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortCode>> {
        self.inner.get_by_original_url(original_url).await
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlRecord>> {
        self.inner.list_by_owner(owner).await
    }

    async fn stats(&self) -> Result<StorageStats> {
        self.inner.stats().await
    }

    async fn health_check(&self, deadline: Duration) -> Result<()> {
        self.inner.health_check(deadline).await
    }
}

#[async_trait]
impl Repository for GatedRepository {
    async fn put(&self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        self.inner.put(code, original_url, owner).await
    }

    async fn put_batch(&self, entries: &[BatchEntry], owner: &str) -> Result<()> {
        self.inner.put_batch(entries, owner).await
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|_| StorageError::Unavailable("gate closed".into()))?
            .forget();
        if self.fail {
            return Err(StorageError::Unavailable("scripted failure".into()));
        }
        self.inner.mark_deleted(codes, owner).await
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

fn code(s: &str) -> ShortCode {
    ShortCode::new(s)
}

async fn is_deleted<R: ReadRepository + ?Sized>(repo: &R, c: &str) -> bool {
    matches!(repo.get(&code(c)).await, Err(StorageError::Deleted(_)))
}

async fn seed<R: Repository + ?Sized>(repo: &R, owner: &str, codes: &[&str]) {
    for c in codes {
        repo.put(&code(c), &format!("https://example.com/{c}"), owner)
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletions_are_applied_asynchronously() {
    let repo = Arc::new(InMemoryRepository::new());
    seed(repo.as_ref(), "u1", &["code0001", "code0002"]).await;

    let pipeline = DeletionPipeline::start(Arc::clone(&repo), DeletionConfig::default());
    pipeline
        .accept("u1", vec![code("code0001"), code("code0002")])
        .await
        .unwrap();

    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(20))
        .until_async(|| async {
            is_deleted(repo.as_ref(), "code0001").await && is_deleted(repo.as_ref(), "code0002").await
        })
        .await;

    let records = repo.list_by_owner("u1").await.unwrap();
    assert!(records.iter().all(|record| record.deleted));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn foreign_codes_are_left_alone() {
    let repo = Arc::new(InMemoryRepository::new());
    seed(repo.as_ref(), "u1", &["code0001"]).await;
    seed(repo.as_ref(), "u2", &["code0002"]).await;

    let pipeline = DeletionPipeline::start(Arc::clone(&repo), DeletionConfig::default());
    pipeline
        .accept("u1", vec![code("code0001"), code("code0002"), code("missing")])
        .await
        .unwrap();
    pipeline.drain().await;

    assert!(is_deleted(repo.as_ref(), "code0001").await);
    assert!(!is_deleted(repo.as_ref(), "code0002").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accept_waits_while_queue_is_full() {
    let repo = Arc::new(GatedRepository::closed());
    seed(repo.as_ref(), "u1", &["code0001", "code0002", "code0003"]).await;

    let pipeline = DeletionPipeline::start(
        Arc::clone(&repo),
        DeletionConfig::builder().workers(1).queue_capacity(1).build(),
    );

    pipeline.accept("u1", vec![code("code0001")]).await.unwrap();
    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(10))
        .until_async(|| async { repo.calls() == 1 })
        .await;

    // The only worker is busy, so this one fills the queue.
    pipeline.accept("u1", vec![code("code0002")]).await.unwrap();
    assert_eq!(pipeline.queued(), 1);

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.accept("u1", vec![code("code0003")]),
    )
    .await;
    assert!(blocked.is_err(), "accept should wait for room in the queue");

    repo.open_gate();
    pipeline.drain().await;

    assert!(is_deleted(repo.as_ref(), "code0001").await);
    assert!(is_deleted(repo.as_ref(), "code0002").await);
    assert!(!is_deleted(repo.as_ref(), "code0003").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_finishes_in_flight_and_discards_queued() {
    let repo = Arc::new(GatedRepository::closed());
    seed(repo.as_ref(), "u1", &["code0001", "code0002", "code0003"]).await;

    let pipeline = DeletionPipeline::start(
        Arc::clone(&repo),
        DeletionConfig::builder().workers(1).queue_capacity(8).build(),
    );

    pipeline.accept("u1", vec![code("code0001")]).await.unwrap();
    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(10))
        .until_async(|| async { repo.calls() == 1 })
        .await;
    pipeline.accept("u1", vec![code("code0002")]).await.unwrap();
    pipeline.accept("u1", vec![code("code0003")]).await.unwrap();

    // Release the in-flight request only after shutdown has signalled stop.
    tokio::join!(pipeline.shutdown(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        repo.open_gate();
    });

    assert_eq!(repo.calls(), 1);
    assert!(is_deleted(repo.as_ref(), "code0001").await);
    assert!(!is_deleted(repo.as_ref(), "code0002").await);
    assert!(!is_deleted(repo.as_ref(), "code0003").await);

    let err = pipeline
        .accept("u1", vec![code("code0002")])
        .await
        .unwrap_err();
    assert!(matches!(err, ShortenerError::PipelineClosed));
}

#[tokio::test]
async fn failures_are_not_reported_to_the_caller() {
    let repo = Arc::new(GatedRepository::failing());
    seed(repo.as_ref(), "u1", &["code0001"]).await;

    let pipeline = DeletionPipeline::start(Arc::clone(&repo), DeletionConfig::default());
    pipeline.accept("u1", vec![code("code0001")]).await.unwrap();
    pipeline.accept("u1", vec![code("code0001")]).await.unwrap();
    pipeline.drain().await;

    assert_eq!(repo.calls(), 2);
    assert!(!is_deleted(repo.as_ref(), "code0001").await);
}

#[tokio::test]
async fn drained_deletions_survive_file_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("links.json");

    {
        let repo = Arc::new(FileRepository::open(&path).unwrap());
        seed(repo.as_ref(), "u1", &["code0001", "code0002"]).await;

        let pipeline = DeletionPipeline::start(Arc::clone(&repo), DeletionConfig::default());
        pipeline.accept("u1", vec![code("code0001")]).await.unwrap();
        pipeline.drain().await;
        repo.shutdown().await.unwrap();
    }

    let reopened = FileRepository::open(&path).unwrap();
    assert!(is_deleted(&reopened, "code0001").await);
    assert_eq!(
        reopened.get(&code("code0002")).await.unwrap().as_deref(),
        Some("https://example.com/code0002")
    );
}

#[tokio::test]
async fn many_owners_concurrently() {
    let repo = Arc::new(InMemoryRepository::new());
    for owner in 0..20 {
        let codes: Vec<String> = (0..5).map(|i| format!("o{owner:02}c{i:04}")).collect();
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        seed(repo.as_ref(), &format!("user{owner}"), &refs).await;
    }

    let pipeline = Arc::new(DeletionPipeline::start(
        Arc::clone(&repo),
        DeletionConfig::builder().workers(4).queue_capacity(4).build(),
    ));

    let mut handles = Vec::new();
    for owner in 0..20 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let codes = (0..5).map(|i| code(&format!("o{owner:02}c{i:04}"))).collect();
            pipeline.accept(format!("user{owner}"), codes).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    pipeline.drain().await;

    for owner in 0..20 {
        let records = repo.list_by_owner(&format!("user{owner}")).await.unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|record| record.deleted));
    }
}
