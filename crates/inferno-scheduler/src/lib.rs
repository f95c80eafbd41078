//! Batch scheduler and stage-aware orchestrator (spec §4.5, §4.6).

pub mod batch;
pub mod orchestrator;

pub use batch::{Batch, BatchExecutor, BatchMetrics, BatchScheduler};
pub use orchestrator::{NoopMetrics, OrchestratorMetrics, Router, StageAwareOrchestrator};
