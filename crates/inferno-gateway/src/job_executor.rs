//! Wires the async job manager's [`JobExecutor`] seam to the stage-aware
//! orchestrator (spec §4.7's "composition root wiring `StageAwareOrchestrator`").

use std::sync::Arc;

use async_trait::async_trait;
use inferno_kernel::{ErrorClass, GatewayError, InferenceRequest, InferenceResponse};
use inferno_jobs::JobExecutor;
use inferno_scheduler::StageAwareOrchestrator;
use tokio_util::sync::CancellationToken;

pub struct OrchestratorJobExecutor {
    orchestrator: Arc<StageAwareOrchestrator>,
}

impl OrchestratorJobExecutor {
    pub fn new(orchestrator: Arc<StageAwareOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobExecutor for OrchestratorJobExecutor {
    async fn execute(&self, request: &InferenceRequest, cancel: CancellationToken) -> Result<InferenceResponse, GatewayError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(GatewayError::new(ErrorClass::Internal, "job cancelled", "jobs").with_request_id(request.request_id.clone()))
            }
            result = self.orchestrator.dispatch(request, true) => result,
        }
    }
}
