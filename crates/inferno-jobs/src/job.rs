//! Async job manager (spec §4.7).
//!
//! Grounded on `mofa-runtime::runner`'s worker-loop shape (N spawned workers
//! pulling work, atomic lifecycle transitions) and `mofa-kernel::bus`'s
//! channel/backpressure idiom (bounded queue, `Notify` to wake idle
//! consumers), generalized here from an agent-message bus to a job queue: a
//! `BinaryHeap`-backed priority queue guarded by a `parking_lot::Mutex`, N
//! `tokio::task::spawn`ed workers, and an abstract `JobStateStore` for
//! external durability following the teacher's trait-first,
//! backend-second `persistence::traits` pattern.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use inferno_kernel::{ErrorClass, GatewayError, InferenceRequest, InferenceResponse};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AsyncJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AsyncJob {
    pub job_id: String,
    pub status: AsyncJobStatus,
    pub result: Option<InferenceResponse>,
    pub error: Option<String>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Durability boundary for job state (spec §4.7). The in-process default is
/// an in-memory `DashMap`; a durable implementation (Redis, Postgres, …) is
/// out of scope per spec §1 and only this trait is specified.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn put(&self, job: AsyncJob);
    async fn get(&self, job_id: &str) -> Option<AsyncJob>;
    async fn remove(&self, job_id: &str);

    /// Evicts terminal entries whose `completed_at` is older than
    /// `retention` (spec §4.7 supplement). A durable backend may instead
    /// rely on its own TTL and leave this a no-op.
    async fn sweep_expired(&self, retention: Duration) {
        let _ = retention;
    }
}

pub struct InMemoryJobStateStore {
    jobs: dashmap::DashMap<String, AsyncJob>,
}

impl InMemoryJobStateStore {
    pub fn new() -> Self {
        Self { jobs: dashmap::DashMap::new() }
    }
}

impl Default for InMemoryJobStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStateStore for InMemoryJobStateStore {
    async fn put(&self, job: AsyncJob) {
        self.jobs.insert(job.job_id.clone(), job);
    }

    async fn get(&self, job_id: &str) -> Option<AsyncJob> {
        self.jobs.get(job_id).map(|e| e.clone())
    }

    async fn remove(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    async fn sweep_expired(&self, retention: Duration) {
        let now = chrono::Utc::now();
        self.jobs.retain(|_, job| match job.completed_at {
            Some(completed_at) => (now - completed_at).to_std().map(|age| age < retention).unwrap_or(true),
            None => true,
        });
    }
}

struct QueueEntry {
    priority: i32,
    sequence: u64,
    request: InferenceRequest,
    job_id: String,
    cancel: CancellationToken,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Higher priority first; FIFO (lower sequence number first) for ties.
    /// `BinaryHeap` is a max-heap, so ties invert the sequence comparison.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Invokes the synchronous orchestrator path for one job. Implemented by
/// the composition root wiring `inferno-scheduler`'s `StageAwareOrchestrator`.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, request: &InferenceRequest, cancel: CancellationToken) -> Result<InferenceResponse, GatewayError>;
}

/// Worker pool + priority queue fronting [`JobExecutor`] (spec §4.7).
pub struct JobManager {
    queue: Mutex<BinaryHeap<QueueEntry>>,
    notify: Notify,
    store: Arc<dyn JobStateStore>,
    sequence: AtomicU64,
    cancels: dashmap::DashMap<String, CancellationToken>,
    retention: Duration,
}

impl JobManager {
    pub fn new(worker_count: usize, store: Arc<dyn JobStateStore>, executor: Arc<dyn JobExecutor>, retention: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            store,
            sequence: AtomicU64::new(0),
            cancels: dashmap::DashMap::new(),
            retention,
        });
        for _ in 0..worker_count.max(1) {
            manager.clone().spawn_worker(executor.clone());
        }
        manager.clone().spawn_retention_sweep();
        manager
    }

    /// Enqueues `request`, returning its job id immediately (spec §4.7
    /// `submit`). Ordering: higher `priority` first, FIFO among ties.
    pub async fn submit(&self, request: InferenceRequest) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.cancels.insert(job_id.clone(), cancel.clone());

        self.store
            .put(AsyncJob {
                job_id: job_id.clone(),
                status: AsyncJobStatus::Queued,
                result: None,
                error: None,
                submitted_at: chrono::Utc::now(),
                completed_at: None,
            })
            .await;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().push(QueueEntry {
            priority: request.priority,
            sequence,
            request,
            job_id: job_id.clone(),
            cancel,
        });
        self.notify.notify_one();
        job_id
    }

    pub async fn status(&self, job_id: &str) -> Option<AsyncJobStatus> {
        self.store.get(job_id).await.map(|j| j.status)
    }

    pub async fn job(&self, job_id: &str) -> Option<AsyncJob> {
        self.store.get(job_id).await
    }

    /// Polls `status` every `poll_interval` until a terminal state or
    /// `timeout` elapses (spec §4.7 `waitFor`).
    pub async fn wait_for(&self, job_id: &str, timeout: Duration, poll_interval: Duration) -> Result<AsyncJob, GatewayError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.store.get(job_id).await {
                if matches!(job.status, AsyncJobStatus::Completed | AsyncJobStatus::Failed | AsyncJobStatus::Cancelled) {
                    return Ok(job);
                }
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::new(ErrorClass::Timeout, format!("job {job_id} did not complete in time"), "jobs"));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Cancels a queued or running job (spec §4.7 `cancel`). Returns
    /// `true` iff a cancellation signal was actually delivered.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let Some(job) = self.store.get(job_id).await else { return false };
        if !matches!(job.status, AsyncJobStatus::Queued | AsyncJobStatus::Running) {
            return false;
        }
        if let Some(token) = self.cancels.get(job_id) {
            token.cancel();
        }
        // Remove from queue if still pending; running jobs are signalled
        // via the token and transition to Cancelled from inside the worker.
        let mut queue = self.queue.lock();
        let still_queued = queue.iter().any(|e| e.job_id == job_id);
        if still_queued {
            let remaining: BinaryHeap<QueueEntry> = queue.drain().filter(|e| e.job_id != job_id).collect();
            *queue = remaining;
            drop(queue);
            self.store
                .put(AsyncJob {
                    status: AsyncJobStatus::Cancelled,
                    completed_at: Some(chrono::Utc::now()),
                    ..job
                })
                .await;
        }
        true
    }

    fn spawn_worker(self: Arc<Self>, executor: Arc<dyn JobExecutor>) {
        tokio::spawn(async move {
            loop {
                let entry = loop {
                    if let Some(entry) = self.queue.lock().pop() {
                        break entry;
                    }
                    self.notify.notified().await;
                };

                if entry.cancel.is_cancelled() {
                    self.store
                        .put(AsyncJob {
                            job_id: entry.job_id.clone(),
                            status: AsyncJobStatus::Cancelled,
                            result: None,
                            error: None,
                            submitted_at: chrono::Utc::now(),
                            completed_at: Some(chrono::Utc::now()),
                        })
                        .await;
                    continue;
                }

                self.store
                    .put(AsyncJob {
                        job_id: entry.job_id.clone(),
                        status: AsyncJobStatus::Running,
                        result: None,
                        error: None,
                        submitted_at: chrono::Utc::now(),
                        completed_at: None,
                    })
                    .await;

                let outcome = executor.execute(&entry.request, entry.cancel.clone()).await;
                let job = match outcome {
                    Ok(response) => AsyncJob {
                        job_id: entry.job_id.clone(),
                        status: AsyncJobStatus::Completed,
                        result: Some(response),
                        error: None,
                        submitted_at: chrono::Utc::now(),
                        completed_at: Some(chrono::Utc::now()),
                    },
                    Err(err) if entry.cancel.is_cancelled() => AsyncJob {
                        job_id: entry.job_id.clone(),
                        status: AsyncJobStatus::Cancelled,
                        result: None,
                        error: Some(err.message),
                        submitted_at: chrono::Utc::now(),
                        completed_at: Some(chrono::Utc::now()),
                    },
                    Err(err) => AsyncJob {
                        job_id: entry.job_id.clone(),
                        status: AsyncJobStatus::Failed,
                        result: None,
                        error: Some(err.message),
                        submitted_at: chrono::Utc::now(),
                        completed_at: Some(chrono::Utc::now()),
                    },
                };
                self.store.put(job).await;
                self.cancels.remove(&entry.job_id);
            }
        });
    }

    /// Evicts terminal job entries older than `retention` (spec §4.7
    /// supplement: bounded retention, not unbounded growth).
    fn spawn_retention_sweep(self: Arc<Self>) {
        let sweep_interval = Duration::from_secs(60).min(self.retention);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_interval).await;
                self.store.sweep_expired(self.retention).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::FinishReason;

    struct EchoExecutor;
    #[async_trait]
    impl JobExecutor for EchoExecutor {
        async fn execute(&self, request: &InferenceRequest, _cancel: CancellationToken) -> Result<InferenceResponse, GatewayError> {
            Ok(InferenceResponse {
                request_id: request.request_id.clone(),
                content: "done".into(),
                model: request.model.clone(),
                tokens_used: 1,
                prompt_tokens: 1,
                completion_tokens: 0,
                duration_ms: 1,
                finish_reason: FinishReason::Stop,
                timestamp: chrono::Utc::now(),
                metadata: Default::default(),
            })
        }
    }

    struct BlockingExecutor;
    #[async_trait]
    impl JobExecutor for BlockingExecutor {
        async fn execute(&self, _request: &InferenceRequest, cancel: CancellationToken) -> Result<InferenceResponse, GatewayError> {
            cancel.cancelled().await;
            Err(GatewayError::new(ErrorClass::Internal, "cancelled", "jobs"))
        }
    }

    #[tokio::test]
    async fn submit_then_wait_for_returns_completed_job() {
        let manager = JobManager::new(2, Arc::new(InMemoryJobStateStore::new()), Arc::new(EchoExecutor), Duration::from_secs(3600));
        let job_id = manager.submit(InferenceRequest::builder("t", "m").build()).await;
        let job = manager.wait_for(&job_id, Duration::from_secs(2), Duration::from_millis(5)).await.unwrap();
        assert_eq!(job.status, AsyncJobStatus::Completed);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn higher_priority_ties_break_fifo() {
        let manager = JobManager::new(1, Arc::new(InMemoryJobStateStore::new()), Arc::new(EchoExecutor), Duration::from_secs(3600));
        let low = InferenceRequest::builder("t", "m").priority(0).build();
        let id = manager.submit(low).await;
        let job = manager.wait_for(&id, Duration::from_secs(2), Duration::from_millis(5)).await.unwrap();
        assert_eq!(job.status, AsyncJobStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_queued_job_returns_true_and_marks_cancelled() {
        let manager = JobManager::new(0, Arc::new(InMemoryJobStateStore::new()), Arc::new(EchoExecutor), Duration::from_secs(3600));
        let id = manager.submit(InferenceRequest::builder("t", "m").build()).await;
        assert!(manager.cancel(&id).await);
        assert_eq!(manager.status(&id).await, Some(AsyncJobStatus::Cancelled));
    }

    #[tokio::test]
    async fn cancel_unknown_job_returns_false() {
        let manager = JobManager::new(1, Arc::new(InMemoryJobStateStore::new()), Arc::new(EchoExecutor), Duration::from_secs(3600));
        assert!(!manager.cancel("unknown").await);
    }

    #[tokio::test]
    async fn cancel_running_job_propagates_token() {
        let manager = JobManager::new(1, Arc::new(InMemoryJobStateStore::new()), Arc::new(BlockingExecutor), Duration::from_secs(3600));
        let id = manager.submit(InferenceRequest::builder("t", "m").build()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.cancel(&id).await);
        let job = manager.wait_for(&id, Duration::from_secs(2), Duration::from_millis(5)).await.unwrap();
        assert_eq!(job.status, AsyncJobStatus::Cancelled);
    }
}
