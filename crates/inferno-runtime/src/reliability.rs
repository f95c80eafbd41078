//! Reliability envelope: bulkhead, timeout, retry and circuit breaker
//! wrapping every provider call (spec §4.4).
//!
//! Grounded on `mofa-foundation::circuit_breaker::{state, config, metrics}` —
//! same three-state machine (Closed/Open/HalfOpen), same window-based
//! failure-rate opening condition, adapted to the spec's window defined by
//! request *volume* rather than wall-clock duration (request_volume_threshold
//! = 20, spec §4.4) and to return the envelope's own error type instead of a
//! trait object.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use crate::provider::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("circuit open for {provider_id}")]
    CircuitOpen { provider_id: String },
    #[error("bulkhead full for {provider_id}")]
    BulkheadFull { provider_id: String },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Request-volume-windowed circuit breaker (spec §4.4). One instance per
/// provider; the router holds these behind an `Arc` shared with every
/// session for that provider.
pub struct CircuitBreaker {
    provider_id: String,
    request_volume_threshold: u32,
    failure_ratio: f64,
    delay: Duration,
    success_threshold: u32,
    state: RwLock<CircuitState>,
    opened_at: RwLock<Option<Instant>>,
    window_requests: AtomicU64,
    window_failures: AtomicU64,
    half_open_successes: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(
        provider_id: impl Into<String>,
        request_volume_threshold: u32,
        failure_ratio: f64,
        delay: Duration,
        success_threshold: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.into(),
            request_volume_threshold,
            failure_ratio,
            delay,
            success_threshold,
            state: RwLock::new(CircuitState::Closed),
            opened_at: RwLock::new(None),
            window_requests: AtomicU64::new(0),
            window_failures: AtomicU64::new(0),
            half_open_successes: AtomicU32::new(0),
        })
    }

    /// Matches kernel's [`inferno_kernel::config::CircuitBreakerConfig`]
    /// defaults (request_volume_threshold=20, failure_ratio=0.5,
    /// delay_ms=30000, success_threshold=3).
    pub fn with_defaults(provider_id: impl Into<String>) -> Arc<Self> {
        Self::new(provider_id, 20, 0.5, Duration::from_millis(30_000), 3)
    }

    pub async fn state(&self) -> CircuitState {
        let current = *self.state.read().await;
        if current == CircuitState::Open {
            if let Some(opened_at) = *self.opened_at.read().await {
                if opened_at.elapsed() >= self.delay {
                    self.transition_to_half_open().await;
                    return *self.state.read().await;
                }
            }
        }
        current
    }

    pub async fn can_execute(&self) -> bool {
        !matches!(self.state().await, CircuitState::Open)
    }

    pub async fn record_success(&self) {
        match self.state().await {
            CircuitState::Closed => {
                self.window_requests.fetch_add(1, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.success_threshold {
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        match self.state().await {
            CircuitState::Closed => {
                let total = self.window_requests.fetch_add(1, Ordering::SeqCst) + 1;
                let failures = self.window_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if total >= self.request_volume_threshold as u64
                    && (failures as f64 / total as f64) >= self.failure_ratio
                {
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open().await;
            }
            CircuitState::Open => {}
        }
    }

    async fn transition_to_open(&self) {
        let mut state = self.state.write().await;
        if *state != CircuitState::Open {
            warn!(provider = %self.provider_id, "circuit breaker opened");
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    async fn transition_to_half_open(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::Open {
            info!(provider = %self.provider_id, "circuit breaker half-open, probing");
            *state = CircuitState::HalfOpen;
            self.half_open_successes.store(0, Ordering::SeqCst);
        }
    }

    async fn transition_to_closed(&self) {
        let mut state = self.state.write().await;
        info!(provider = %self.provider_id, "circuit breaker closed");
        *state = CircuitState::Closed;
        self.window_requests.store(0, Ordering::SeqCst);
        self.window_failures.store(0, Ordering::SeqCst);
        *self.opened_at.write().await = None;
    }
}

/// Exponential backoff with full jitter (spec §4.4).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `n` (0-indexed), full jitter in [0, cap].
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap = self.base_delay.saturating_mul(2u32.saturating_pow(attempt)).min(self.max_delay);
        let jittered_ms = rand::thread_rng().gen_range(0..=cap.as_millis().max(1) as u64);
        Duration::from_millis(jittered_ms)
    }
}

/// Per-provider wrapper combining a bulkhead (bounded concurrency), a
/// per-call timeout, retry with backoff, and the circuit breaker above.
/// Every provider call in the runtime goes through this, not the bare
/// [`crate::provider::ProviderRuntime`] trait (spec §4.4).
pub struct ReliabilityEnvelope {
    provider_id: String,
    bulkhead: Arc<Semaphore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ReliabilityEnvelope {
    pub fn new(provider_id: impl Into<String>, max_concurrent: usize, timeout: Duration) -> Self {
        let provider_id = provider_id.into();
        Self {
            breaker: CircuitBreaker::with_defaults(provider_id.clone()),
            provider_id,
            bulkhead: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retry: RetryPolicy::default(),
            timeout,
        }
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Runs `call` behind the bulkhead/timeout/retry/circuit-breaker
    /// envelope. `call` is invoked fresh on every retry attempt.
    pub async fn run<F, Fut, T>(&self, mut call: F) -> Result<T, EnvelopeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RuntimeError>>,
    {
        if !self.breaker.can_execute().await {
            return Err(EnvelopeError::CircuitOpen {
                provider_id: self.provider_id.clone(),
            });
        }

        let _permit = self
            .bulkhead
            .try_acquire()
            .map_err(|_| EnvelopeError::BulkheadFull {
                provider_id: self.provider_id.clone(),
            })?;

        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.timeout, call())
                .await
                .unwrap_or(Err(RuntimeError::Timeout));

            match outcome {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) if err.retryable() && attempt + 1 < self.retry.max_attempts => {
                    self.breaker.record_failure().await;
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.breaker.record_failure().await;
                    return Err(EnvelopeError::Runtime(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn circuit_opens_after_threshold_ratio_within_volume_window() {
        let breaker = CircuitBreaker::new("p1", 4, 0.5, Duration::from_millis(50), 1);
        assert!(breaker.can_execute().await);
        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.can_execute().await); // only 3 requests, under volume threshold
        breaker.record_failure().await;
        assert!(!breaker.can_execute().await); // 4 requests, 100% failure >= 50%
    }

    #[tokio::test]
    async fn circuit_half_opens_after_delay_and_closes_on_success() {
        let breaker = CircuitBreaker::new("p2", 1, 0.5, Duration::from_millis(10), 1);
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn retry_eventually_succeeds_after_transient_failures() {
        let envelope = ReliabilityEnvelope::new("p3", 4, Duration::from_secs(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        let result = envelope
            .run(move || {
                let attempts = attempts2.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(RuntimeError::Network("flaky".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let envelope = ReliabilityEnvelope::new("p4", 4, Duration::from_secs(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        let result = envelope
            .run(move || {
                let attempts = attempts2.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(RuntimeError::Validation("bad request".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(EnvelopeError::Runtime(RuntimeError::Validation(_)))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
