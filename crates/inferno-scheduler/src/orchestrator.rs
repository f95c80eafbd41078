//! Stage-aware orchestrator (spec §4.6).
//!
//! Grounded on `mofa-foundation::inference::orchestrator::InferenceOrchestrator`:
//! a struct composing a router and a metrics sink behind `Arc`, a pure
//! `resolve_stage` classification step, and a `dispatch` wrapped in a
//! `tracing::instrument` span so latency/outcome land in the request's span
//! tree the way the teacher's handlers do.

use std::sync::Arc;
use std::time::Instant;

use inferno_kernel::{GatewayError, InferenceRequest, InferenceResponse, InferenceStage};

/// Minimal metrics sink this module needs; `inferno-observability` provides
/// the concrete `MetricsPublisher` implementation.
pub trait OrchestratorMetrics: Send + Sync {
    fn record_dispatch(&self, model: &str, provider: &str, stage: InferenceStage, success: bool, latency_ms: u64);
}

pub struct NoopMetrics;
impl OrchestratorMetrics for NoopMetrics {
    fn record_dispatch(&self, _model: &str, _provider: &str, _stage: InferenceStage, _success: bool, _latency_ms: u64) {}
}

/// Resolved provider call the orchestrator dispatches to — implemented by
/// `inferno-runtime`'s registry/session pair in the composition root.
#[async_trait::async_trait]
pub trait Router: Send + Sync {
    async fn route_and_call(&self, request: &InferenceRequest) -> Result<(String, InferenceResponse), GatewayError>;
}

pub struct StageAwareOrchestrator {
    router: Arc<dyn Router>,
    metrics: Arc<dyn OrchestratorMetrics>,
    small_prompt_threshold: u32,
    disaggregation: bool,
}

impl StageAwareOrchestrator {
    pub fn new(
        router: Arc<dyn Router>,
        metrics: Arc<dyn OrchestratorMetrics>,
        small_prompt_threshold: u32,
        disaggregation: bool,
    ) -> Self {
        Self {
            router,
            metrics,
            small_prompt_threshold,
            disaggregation,
        }
    }

    /// Stage resolution per spec §4.6: respect an explicit stage, else
    /// COMBINED when disaggregation is off, else approximate prompt size
    /// against `small_prompt_threshold`.
    pub fn resolve_stage(&self, request: &InferenceRequest, is_first_execution: bool) -> InferenceStage {
        if request.inference_stage != InferenceStage::Unresolved {
            return request.inference_stage;
        }
        if !self.disaggregation {
            return InferenceStage::Combined;
        }
        let prompt_tokens = request.approximate_prompt_tokens();
        if prompt_tokens < self.small_prompt_threshold {
            InferenceStage::Combined
        } else if is_first_execution {
            InferenceStage::Prefill
        } else {
            InferenceStage::Decode
        }
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id, model = %request.model))]
    pub async fn dispatch(
        &self,
        request: &InferenceRequest,
        is_first_execution: bool,
    ) -> Result<InferenceResponse, GatewayError> {
        let stage = self.resolve_stage(request, is_first_execution);
        let staged = request.with_stage(stage);
        let start = Instant::now();

        let result = self.router.route_and_call(&staged).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok((provider_id, _)) => {
                self.metrics.record_dispatch(&staged.model, provider_id, stage, true, latency_ms);
            }
            Err(err) => {
                self.metrics.record_dispatch(&staged.model, &err.origin_node, stage, false, latency_ms);
            }
        }

        result.map(|(_, response)| response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::{ErrorClass, FinishReason, Role};

    struct StubRouter {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Router for StubRouter {
        async fn route_and_call(&self, request: &InferenceRequest) -> Result<(String, InferenceResponse), GatewayError> {
            if self.fail {
                return Err(GatewayError::new(ErrorClass::ProviderUnavailable, "down", "p1"));
            }
            Ok((
                "p1".to_string(),
                InferenceResponse {
                    request_id: request.request_id.clone(),
                    content: "hi".into(),
                    model: request.model.clone(),
                    tokens_used: 1,
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    duration_ms: 1,
                    finish_reason: FinishReason::Stop,
                    timestamp: chrono::Utc::now(),
                    metadata: Default::default(),
                },
            ))
        }
    }

    #[test]
    fn explicit_stage_is_respected() {
        let orchestrator = StageAwareOrchestrator::new(
            Arc::new(StubRouter { fail: false }),
            Arc::new(NoopMetrics),
            32,
            true,
        );
        let request = InferenceRequest::builder("t", "m")
            .message(Role::User, "hi")
            .build()
            .with_stage(InferenceStage::Decode);
        assert_eq!(orchestrator.resolve_stage(&request, true), InferenceStage::Decode);
    }

    #[test]
    fn combined_when_disaggregation_disabled() {
        let orchestrator = StageAwareOrchestrator::new(
            Arc::new(StubRouter { fail: false }),
            Arc::new(NoopMetrics),
            32,
            false,
        );
        let request = InferenceRequest::builder("t", "m").message(Role::User, "hi").build();
        assert_eq!(orchestrator.resolve_stage(&request, true), InferenceStage::Combined);
    }

    #[test]
    fn small_prompt_is_combined_even_with_disaggregation_enabled() {
        let orchestrator = StageAwareOrchestrator::new(
            Arc::new(StubRouter { fail: false }),
            Arc::new(NoopMetrics),
            1000,
            true,
        );
        let request = InferenceRequest::builder("t", "m").message(Role::User, "hi").build();
        assert_eq!(orchestrator.resolve_stage(&request, true), InferenceStage::Combined);
    }

    #[test]
    fn large_prompt_resolves_prefill_then_decode() {
        let orchestrator = StageAwareOrchestrator::new(
            Arc::new(StubRouter { fail: false }),
            Arc::new(NoopMetrics),
            1,
            true,
        );
        let request = InferenceRequest::builder("t", "m")
            .message(Role::User, "a".repeat(100))
            .build();
        assert_eq!(orchestrator.resolve_stage(&request, true), InferenceStage::Prefill);
        assert_eq!(orchestrator.resolve_stage(&request, false), InferenceStage::Decode);
    }

    #[tokio::test]
    async fn dispatch_propagates_router_failure() {
        let orchestrator = StageAwareOrchestrator::new(
            Arc::new(StubRouter { fail: true }),
            Arc::new(NoopMetrics),
            32,
            false,
        );
        let request = InferenceRequest::builder("t", "m").build();
        assert!(orchestrator.dispatch(&request, true).await.is_err());
    }
}
