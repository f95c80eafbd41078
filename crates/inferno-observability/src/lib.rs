//! Metrics collection, tracing init, and SLI/burn-rate tracking for the
//! inference execution plane (spec §10 ambient).
//!
//! Cost attribution itself lives in `inferno_plugins::CostAttributionPlugin`
//! (a POST_INFER pipeline step); this crate supplies the metrics registry
//! and SLI tracking that observability also covers.

pub mod metrics;
pub mod publisher;
pub mod sli;
pub mod tracing_init;

pub use metrics::{Counter, Gauge, Histogram, HistogramSnapshot, MetricsRegistry, MetricsSnapshot};
pub use publisher::MetricsPublisher;
pub use sli::SliTracker;
pub use tracing_init::{init_tracing, LogFormat};
