//! Process entry point.
//!
//! Reads `GatewayConfig` (file path from `INFERNO_CONFIG`, merged with
//! `INFERNO_`-prefixed environment overrides per `inferno_kernel::config`),
//! initializes tracing, and builds the composition root. The non-HTTP
//! entry points it exposes (`inferno_gateway::handlers`) are called by an
//! external REST layer that is out of this workspace's scope (spec §1).

use inferno_gateway::AppState;
use inferno_observability::{init_tracing, LogFormat};

#[tokio::main]
async fn main() {
    if let Err(err) = init_tracing(LogFormat::Json) {
        eprintln!("tracing already initialized: {err}");
    }

    let config_path = std::env::var("INFERNO_CONFIG").ok();
    let config = match inferno_kernel::config::load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration, falling back to defaults");
            Default::default()
        }
    };

    let state = AppState::build(config);
    tracing::info!(
        providers = state.provider_registry.len(),
        "inference execution plane composition root initialized"
    );

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(err) => tracing::error!(%err, "failed to listen for shutdown signal"),
    }
}
