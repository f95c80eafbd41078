//! Bridges the batch scheduler to the stage-aware orchestrator (spec
//! §4.5/§4.6 handoff: "scheduler enqueues and batches -> provider session
//! executes").
//!
//! Native batched invocation itself is out of scope (spec §1: no bindings
//! to llama.cpp/libtorch/CUDA), so a dispatched batch fans out to the
//! orchestrator concurrently, one call per request, the way the teacher's
//! `adapter::scheduler` hands a drained batch to its executor callback.

use std::sync::Arc;

use futures::future::join_all;
use inferno_scheduler::{Batch, BatchExecutor, StageAwareOrchestrator};

pub struct OrchestratorBatchExecutor {
    orchestrator: Arc<StageAwareOrchestrator>,
}

impl OrchestratorBatchExecutor {
    pub fn new(orchestrator: Arc<StageAwareOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl BatchExecutor for OrchestratorBatchExecutor {
    async fn execute(&self, batch: Batch) -> Vec<Result<inferno_kernel::InferenceResponse, inferno_kernel::GatewayError>> {
        join_all(batch.requests.iter().map(|request| async move { self.orchestrator.dispatch(request, true).await })).await
    }
}
