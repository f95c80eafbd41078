//! Tracing subscriber initialization (spec §10 ambient).
//!
//! Grounded on the teacher's composition-root tracing setup: an
//! `EnvFilter` sourced from `RUST_LOG` (default `info`) feeding a JSON
//! formatter, installed once as the global subscriber at process start.
//! The teacher's OpenTelemetry span-export machinery
//! (`mofa-monitoring::tracing::{tracer,exporter,propagator}`) is not
//! carried over — this workspace has no distributed span sink to export
//! to — only the local structured-logging init survives.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Installs the global tracing subscriber. Safe to call at most once per
/// process; the composition root calls this before building any other
/// component so early startup errors are still logged structurally.
pub fn init_tracing(format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
}
