//! `AppState`: the single composition root (spec §2 [AMBIENT]).
//!
//! Grounded on `mofa-gateway/src/state.rs` / `server.rs`: one struct
//! holding every component behind an `Arc`, built once in `main` and
//! cloned per request handler. No ambient/global statics — every
//! component receives its collaborators by constructor argument.

use std::sync::Arc;
use std::time::Duration;

use inferno_cache::BlockPool;
use inferno_jobs::JobManager;
use inferno_kernel::config::GatewayConfig;
use inferno_kernel::PluginRegistry;
use inferno_observability::{MetricsPublisher, MetricsRegistry};
use inferno_plugins::{ContentSafetyPlugin, CostAttributionPlugin, SchemaValidationPlugin};
use inferno_quota::QuotaAdmission;
use inferno_runtime::{ProviderRegistry, RoutingStrategy, SessionManager};
use inferno_scheduler::{BatchScheduler, StageAwareOrchestrator};

use crate::executor::OrchestratorBatchExecutor;
use crate::job_executor::OrchestratorJobExecutor;
use crate::router::{GatewayRouter, ProviderBackend};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<BlockPool>,
    pub provider_registry: Arc<ProviderRegistry>,
    pub router: Arc<GatewayRouter>,
    pub scheduler: Arc<BatchScheduler>,
    pub orchestrator: Arc<StageAwareOrchestrator>,
    pub jobs: Arc<JobManager>,
    pub quota: Arc<QuotaAdmission>,
    pub plugins: Arc<PluginRegistry>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    /// Builds every component and wires them by `Arc` reference, mirroring
    /// the teacher's `main.rs` composition order: config -> metrics ->
    /// cache -> provider registry -> reliability-wrapped sessions ->
    /// scheduler -> orchestrator -> job manager -> quota -> plugins.
    pub fn build(config: GatewayConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(MetricsRegistry::new());

        let cache = Arc::new(BlockPool::new(config.kvcache.total_blocks, config.kvcache.block_size));

        let provider_registry = Arc::new(ProviderRegistry::new(RoutingStrategy::LeastLoaded));
        let sessions = Arc::new(SessionManager::new(3));
        let router = Arc::new(GatewayRouter::new(provider_registry.clone(), sessions));

        for provider in &config.providers {
            let descriptor = inferno_kernel::ProviderDescriptor {
                id: provider.id.clone(),
                version: "1".to_string(),
                capabilities: Default::default(),
                health: inferno_kernel::ProviderHealth::Healthy,
            };
            provider_registry.register(descriptor, &[provider.id.clone()]);

            let provider_config = inferno_runtime::ProviderConfig {
                provider_id: provider.id.clone(),
                endpoint: provider.endpoint.clone(),
                api_key: provider.api_key.clone(),
                timeout_ms: provider.timeout_ms,
                max_concurrent_requests: provider.max_concurrent_requests,
                prewarm: provider.prewarm,
                model_path: None,
            };

            let backend = match provider.endpoint.as_deref() {
                Some(endpoint) if endpoint.starts_with("http") => ProviderBackend::OpenAiCompat {
                    endpoint: endpoint.to_string(),
                    api_key: provider.api_key.clone(),
                },
                _ => ProviderBackend::Gguf,
            };
            router.register_backend(provider.id.clone(), backend, provider_config);
        }

        let publisher = Arc::new(MetricsPublisher::new(metrics.clone()));
        let orchestrator = Arc::new(StageAwareOrchestrator::new(
            router.clone(),
            publisher,
            config.scheduler.small_prompt_threshold,
            config.scheduler.disaggregation,
        ));

        let batch_executor = Arc::new(OrchestratorBatchExecutor::new(orchestrator.clone()));
        let scheduler = BatchScheduler::new(config.scheduler.clone(), batch_executor);

        let job_executor = Arc::new(OrchestratorJobExecutor::new(orchestrator.clone()));
        let job_store = Arc::new(inferno_jobs::InMemoryJobStateStore::new());
        let jobs = JobManager::new(4, job_store, job_executor, Duration::from_secs(24 * 3600));

        let quota = Arc::new(QuotaAdmission::new(100.0, 64, 1_000_000));
        for tenant in &config.quota {
            quota.configure_tenant(tenant.tenant_id.clone(), tenant.rps, tenant.concurrent, tenant.daily_token_budget);
        }

        let plugins = Arc::new(PluginRegistry::new(vec![
            Arc::new(SchemaValidationPlugin) as Arc<dyn inferno_kernel::Plugin>,
            Arc::new(ContentSafetyPlugin::default()),
            Arc::new(CostAttributionPlugin::default()),
        ]));

        Arc::new(Self {
            config,
            cache,
            provider_registry,
            router,
            scheduler,
            orchestrator,
            jobs,
            quota,
            plugins,
            metrics,
        })
    }
}
