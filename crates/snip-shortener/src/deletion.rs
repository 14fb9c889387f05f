use crate::{Result, ShortenerError};
use parking_lot::Mutex;
use snip_core::{Repository, ShortCode};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A single "delete these codes for this owner" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub owner: String,
    pub codes: Vec<ShortCode>,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct DeletionConfig {
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<DeletionRequest>>>;

/// Bounded queue of deletion requests served by a fixed pool of workers.
///
/// [`accept`](Self::accept) waits while the queue is full. Each worker
/// applies one request at a time through [`Repository::mark_deleted`];
/// failures are logged and never reach the caller that enqueued them.
///
/// Dropping the pipeline stops the workers once their current request is
/// done. Use [`shutdown`](Self::shutdown) or [`drain`](Self::drain) to wait
/// for them.
pub struct DeletionPipeline {
    sender: Mutex<Option<mpsc::Sender<DeletionRequest>>>,
    receiver: SharedReceiver,
    stop: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionPipeline")
            .field("workers", &self.workers.lock().len())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl DeletionPipeline {
    /// Spawns the workers. Must be called from within a tokio runtime.
    pub fn start<R>(repository: Arc<R>, config: DeletionConfig) -> Self
    where
        R: Repository + ?Sized,
    {
        let capacity = config.queue_capacity.max(1);
        let worker_count = config.workers.max(1);

        let (sender, receiver) = mpsc::channel(capacity);
        let receiver: SharedReceiver = Arc::new(AsyncMutex::new(receiver));
        let (stop, _) = watch::channel(false);

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    repository: Arc::clone(&repository),
                    receiver: Arc::clone(&receiver),
                    stop: stop.subscribe(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = capacity,
            "deletion pipeline started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            stop,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a request, waiting for room if the queue is full.
    ///
    /// Returns as soon as the request is queued; it is applied later by a
    /// worker. Fails with [`ShortenerError::PipelineClosed`] once
    /// [`shutdown`](Self::shutdown) or [`drain`](Self::drain) has begun.
    pub async fn accept(&self, owner: impl Into<String>, codes: Vec<ShortCode>) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(ShortenerError::PipelineClosed)?;

        if codes.is_empty() {
            return Ok(());
        }

        let request = DeletionRequest {
            owner: owner.into(),
            codes,
        };
        trace!(owner = %request.owner, codes = request.codes.len(), "queueing deletion request");

        sender
            .send(request)
            .await
            .map_err(|_| ShortenerError::PipelineClosed)
    }

    /// Number of requests waiting for a worker.
    pub fn queued(&self) -> usize {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.max_capacity() - sender.capacity(),
            None => 0,
        }
    }

    /// Stops intake and the workers.
    ///
    /// Requests already being applied run to completion; requests still
    /// waiting in the queue are discarded and counted in the log.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        self.stop.send_replace(true);
        self.join_workers().await;

        let discarded = self.discard_queued().await;
        if discarded > 0 {
            warn!(discarded, "discarded queued deletion requests");
        }
        info!("deletion pipeline stopped");
    }

    /// Stops intake and waits until every queued request has been applied.
    pub async fn drain(&self) {
        self.sender.lock().take();
        self.join_workers().await;

        // Only reachable if every worker panicked.
        let discarded = self.discard_queued().await;
        if discarded > 0 {
            warn!(discarded, "discarded queued deletion requests");
        }
        info!("deletion pipeline drained");
    }

    async fn join_workers(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "deletion worker panicked");
            }
        }
    }

    async fn discard_queued(&self) -> usize {
        let mut receiver = self.receiver.lock().await;
        receiver.close();

        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

struct Worker<R: ?Sized> {
    id: usize,
    repository: Arc<R>,
    receiver: SharedReceiver,
    stop: watch::Receiver<bool>,
}

impl<R> Worker<R>
where
    R: Repository + ?Sized,
{
    async fn run(mut self) {
        loop {
            let request = tokio::select! {
                biased;
                _ = self.stop.changed() => break,
                request = next_request(&self.receiver) => request,
            };
            let Some(request) = request else {
                break;
            };
            self.apply(request).await;
        }
        debug!(worker = self.id, "deletion worker stopped");
    }

    async fn apply(&self, request: DeletionRequest) {
        debug!(
            worker = self.id,
            owner = %request.owner,
            codes = request.codes.len(),
            "applying deletion request"
        );
        if let Err(err) = self
            .repository
            .mark_deleted(&request.codes, &request.owner)
            .await
        {
            error!(
                worker = self.id,
                owner = %request.owner,
                codes = request.codes.len(),
                error = %err,
                "failed to apply deletion request"
            );
        }
    }
}

async fn next_request(receiver: &SharedReceiver) -> Option<DeletionRequest> {
    receiver.lock().await.recv().await
}
