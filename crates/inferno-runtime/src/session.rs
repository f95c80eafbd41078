//! Provider runtime & session manager (spec §4.2).
//!
//! A [`Session`] is a warmed runner bound to `(tenant_id, model_id,
//! provider_id)`; it owns a bounded semaphore enforcing
//! "at-most-one-per-native-slot" the way the spec requires, and tracks a
//! rolling window of the last 10 outcomes to compute health (degraded
//! >20% failures, unhealthy >50%).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inferno_kernel::{InferenceRequest, InferenceResponse, ProviderHealth, StreamChunk};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Semaphore};

use crate::provider::{ProviderConfig, ProviderRuntime, RuntimeError};

const HEALTH_WINDOW: usize = 10;

/// Request-scoped context threaded through a provider call: cancellation,
/// deadline and tracing fields the reliability envelope and session both
/// need. Deliberately separate from `InferenceRequest` (which is wire
/// data) the way the teacher keeps transport/DTO types distinct from
/// execution context.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub cancel: tokio_util::sync::CancellationToken,
    pub timeout: Duration,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            cancel: tokio_util::sync::CancellationToken::new(),
            timeout,
        }
    }
}

struct HealthWindow {
    outcomes: VecDeque<bool>,
}

impl HealthWindow {
    fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(HEALTH_WINDOW),
        }
    }

    fn record(&mut self, success: bool) {
        if self.outcomes.len() == HEALTH_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn health(&self) -> ProviderHealth {
        if self.outcomes.is_empty() {
            return ProviderHealth::Healthy;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        let ratio = failures as f64 / self.outcomes.len() as f64;
        if ratio > 0.5 {
            ProviderHealth::Unhealthy
        } else if ratio > 0.2 {
            ProviderHealth::Degraded
        } else {
            ProviderHealth::Healthy
        }
    }
}

/// A warmed runner bound to one (tenant, model, provider) triple.
pub struct Session {
    pub tenant_id: String,
    pub model_id: String,
    pub provider_id: String,
    runtime: Arc<dyn ProviderRuntime>,
    slots: Arc<Semaphore>,
    health: SyncMutex<HealthWindow>,
}

impl Session {
    fn new(
        tenant_id: String,
        model_id: String,
        provider_id: String,
        runtime: Arc<dyn ProviderRuntime>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            tenant_id,
            model_id,
            provider_id,
            runtime,
            slots: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            health: SyncMutex::new(HealthWindow::new()),
        }
    }

    pub fn health(&self) -> ProviderHealth {
        self.health.lock().health()
    }

    /// Blocks until a native slot is free (FIFO acquisition, spec §4.2),
    /// then runs the request to completion.
    pub async fn infer(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<InferenceResponse, RuntimeError> {
        let _permit = self.slots.acquire().await.expect("semaphore not closed");
        let result = tokio::time::timeout(ctx.timeout, self.runtime.infer(request, ctx)).await;
        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(RuntimeError::Timeout),
        };
        self.health.lock().record(outcome.is_ok());
        outcome
    }

    /// Finite, non-restartable stream of chunks. Cancellation is checked
    /// once per generation iteration by the underlying runtime (spec §5,
    /// §9 Open Question resolved to the one-iteration convention).
    pub async fn stream(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<StreamChunk>, RuntimeError> {
        let _permit = self.slots.acquire().await.expect("semaphore not closed");
        let result = self.runtime.stream(request, ctx).await;
        self.health.lock().record(result.is_ok());
        result
    }

    pub async fn warmup(&self, requests: &[InferenceRequest]) {
        for req in requests {
            let ctx = RequestContext::new(format!("warmup-{}", req.request_id), Duration::from_secs(30));
            let _ = self.infer(req, &ctx).await;
        }
    }
}

/// Per-(tenant, model, provider) session pool. Initializes sessions lazily
/// on miss and caches them, matching `getSession` (spec §4.2).
pub struct SessionManager {
    sessions: dashmap::DashMap<(String, String, String), Arc<Session>>,
    max_retries: u32,
}

impl SessionManager {
    pub fn new(max_retries: u32) -> Self {
        Self {
            sessions: dashmap::DashMap::new(),
            max_retries,
        }
    }

    pub async fn get_session(
        &self,
        tenant_id: &str,
        model_id: &str,
        runtime_factory: impl Fn() -> Arc<dyn ProviderRuntime>,
        provider_config: &ProviderConfig,
    ) -> Option<Arc<Session>> {
        let key = (tenant_id.to_string(), model_id.to_string(), provider_config.provider_id.clone());
        if let Some(existing) = self.sessions.get(&key) {
            return Some(existing.clone());
        }

        let runtime = runtime_factory();
        let mut attempts = 0;
        loop {
            match runtime.initialize(provider_config).await {
                Ok(()) => {
                    let session = Arc::new(Session::new(
                        tenant_id.to_string(),
                        model_id.to_string(),
                        provider_config.provider_id.clone(),
                        runtime,
                        provider_config.max_concurrent_requests,
                    ));
                    self.sessions.insert(key, session.clone());
                    return Some(session);
                }
                Err(_) if attempts < self.max_retries => {
                    attempts += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(provider = %provider_config.provider_id, %err, "session init failed after retries");
                    return None;
                }
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().runtime.shutdown().await;
        }
        self.sessions.clear();
    }
}

/// Object-safe native call front. Concrete backends (GGUF, LibTorch,
/// OpenAI-compatible HTTP) implement this; the native call itself is an
/// opaque callable per spec §1 (native bindings are out of scope).
#[async_trait]
pub trait NativeCallFront: Send + Sync {
    async fn call(&self, request: &InferenceRequest, ctx: &RequestContext) -> Result<InferenceResponse, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_window_thresholds() {
        let mut window = HealthWindow::new();
        for _ in 0..10 {
            window.record(true);
        }
        assert_eq!(window.health(), ProviderHealth::Healthy);

        for _ in 0..3 {
            window.record(false);
        }
        // last 10: 7 success, 3 failure = 30% -> degraded
        assert_eq!(window.health(), ProviderHealth::Degraded);

        for _ in 0..3 {
            window.record(false);
        }
        // last 10 now: 4 success, 6 failure = 60% -> unhealthy
        assert_eq!(window.health(), ProviderHealth::Unhealthy);
    }
}
