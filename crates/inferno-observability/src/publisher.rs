//! Concrete metrics sink for the stage-aware orchestrator (spec §4.6
//! `MetricsPublisher`).
//!
//! Grounded on `mofa-foundation::inference::orchestrator`'s
//! `Arc<MetricsPublisher>` collaborator: one publisher per process,
//! recording dispatch outcomes tagged by model/provider/stage into the
//! shared [`MetricsRegistry`].

use std::sync::Arc;

use inferno_kernel::InferenceStage;
use inferno_scheduler::OrchestratorMetrics;

use crate::metrics::MetricsRegistry;

pub struct MetricsPublisher {
    registry: Arc<MetricsRegistry>,
}

impl MetricsPublisher {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    fn stage_label(stage: InferenceStage) -> &'static str {
        match stage {
            InferenceStage::Unresolved => "unresolved",
            InferenceStage::Combined => "combined",
            InferenceStage::Prefill => "prefill",
            InferenceStage::Decode => "decode",
        }
    }
}

impl OrchestratorMetrics for MetricsPublisher {
    fn record_dispatch(&self, model: &str, provider: &str, stage: InferenceStage, success: bool, latency_ms: u64) {
        let stage = Self::stage_label(stage);
        self.registry.counter(&format!("dispatch_total:{model}:{provider}:{stage}")).inc();
        if !success {
            self.registry.counter(&format!("dispatch_failures_total:{model}:{provider}:{stage}")).inc();
        }
        self.registry.histogram(&format!("dispatch_latency_ms:{model}:{provider}:{stage}")).observe(latency_ms as f64);

        tracing::debug!(model, provider, stage, success, latency_ms, "dispatch recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_success_and_failure_counters_separately() {
        let registry = Arc::new(MetricsRegistry::new());
        let publisher = MetricsPublisher::new(registry.clone());

        publisher.record_dispatch("gpt-x", "p1", InferenceStage::Combined, true, 12);
        publisher.record_dispatch("gpt-x", "p1", InferenceStage::Combined, false, 40);

        let snap = registry.snapshot();
        assert_eq!(snap.counters["dispatch_total:gpt-x:p1:combined"], 2);
        assert_eq!(snap.counters["dispatch_failures_total:gpt-x:p1:combined"], 1);
    }
}
