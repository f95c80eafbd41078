//! Composition-root `Router` implementation (spec §4.6's `Arc<dyn Router>`
//! collaborator), binding the provider registry, session manager, and
//! per-provider reliability envelopes together.
//!
//! Grounded on `mofa-gateway/src/backend/registry.rs` +
//! `mofa-foundation::inference::routing`: resolve a provider, fetch or
//! warm its session, then run the actual provider call behind that
//! provider's reliability envelope.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use inferno_kernel::{ErrorClass, GatewayError, InferenceRequest, InferenceResponse};
use inferno_runtime::{
    GgufRunner, OpenAiCompatProvider, ProviderConfig, ProviderRegistry, ProviderRuntime,
    ReliabilityEnvelope, RequestContext, RuntimeError, SessionManager, TorchRunner,
};
use inferno_scheduler::Router;
use std::time::Duration;

/// How a provider id resolves to a concrete native call front. Configured
/// once at startup from `GatewayConfig.providers`; the registry and router
/// only ever see provider ids and capabilities, never backend kinds.
#[derive(Clone)]
pub enum ProviderBackend {
    Gguf,
    Torch,
    OpenAiCompat { endpoint: String, api_key: Option<String> },
}

pub struct GatewayRouter {
    registry: Arc<ProviderRegistry>,
    sessions: Arc<SessionManager>,
    envelopes: DashMap<String, Arc<ReliabilityEnvelope>>,
    backends: DashMap<String, ProviderBackend>,
    provider_configs: DashMap<String, ProviderConfig>,
}

impl GatewayRouter {
    pub fn new(registry: Arc<ProviderRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self {
            registry,
            sessions,
            envelopes: DashMap::new(),
            backends: DashMap::new(),
            provider_configs: DashMap::new(),
        }
    }

    pub fn register_backend(&self, provider_id: impl Into<String>, backend: ProviderBackend, config: ProviderConfig) {
        let provider_id = provider_id.into();
        self.envelopes.insert(
            provider_id.clone(),
            Arc::new(ReliabilityEnvelope::new(
                provider_id.clone(),
                config.max_concurrent_requests,
                Duration::from_millis(config.timeout_ms),
            )),
        );
        self.backends.insert(provider_id.clone(), backend);
        self.provider_configs.insert(provider_id, config);
    }

    fn runtime_for(&self, provider_id: &str) -> Option<Arc<dyn ProviderRuntime>> {
        let backend = self.backends.get(provider_id)?.clone();
        Some(match backend {
            ProviderBackend::Gguf => Arc::new(GgufRunner::new(provider_id)),
            ProviderBackend::Torch => Arc::new(TorchRunner::new(provider_id)),
            ProviderBackend::OpenAiCompat { endpoint, api_key } => {
                Arc::new(OpenAiCompatProvider::new(provider_id, endpoint, api_key))
            }
        })
    }
}

#[async_trait]
impl Router for GatewayRouter {
    async fn route_and_call(&self, request: &InferenceRequest) -> Result<(String, InferenceResponse), GatewayError> {
        let decision = self
            .registry
            .route(request)
            .map_err(|err| GatewayError::new(ErrorClass::ProviderUnavailable, err.to_string(), "router"))?;
        let provider_id = decision.provider_id;

        let provider_config = self
            .provider_configs
            .get(&provider_id)
            .map(|c| c.clone())
            .ok_or_else(|| GatewayError::new(ErrorClass::Internal, "provider has no backend config", "router"))?;

        let runtime = self
            .runtime_for(&provider_id)
            .ok_or_else(|| GatewayError::new(ErrorClass::Internal, "provider has no backend registered", "router"))?;

        let session = self
            .sessions
            .get_session(&request.tenant_id, &request.model, || runtime.clone(), &provider_config)
            .await
            .ok_or_else(|| GatewayError::new(ErrorClass::ProviderUnavailable, "session init failed", &provider_id))?;

        let envelope = self
            .envelopes
            .get(&provider_id)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::new(ErrorClass::Internal, "provider has no reliability envelope", "router"))?;

        let ctx = RequestContext::new(request.request_id.clone(), Duration::from_millis(provider_config.timeout_ms));

        let response = envelope
            .run(|| {
                let session = session.clone();
                let request = request.clone();
                let ctx = ctx.clone();
                async move { session.infer(&request, &ctx).await }
            })
            .await
            .map_err(|err| match err {
                inferno_runtime::EnvelopeError::CircuitOpen { provider_id } => {
                    GatewayError::new(ErrorClass::ProviderUnavailable, "circuit open", provider_id)
                }
                inferno_runtime::EnvelopeError::BulkheadFull { provider_id } => {
                    GatewayError::new(ErrorClass::Overloaded, "bulkhead full", provider_id)
                }
                inferno_runtime::EnvelopeError::Runtime(runtime_err) => runtime_error_to_gateway(&provider_id, runtime_err),
            })?;

        Ok((provider_id, response))
    }
}

fn runtime_error_to_gateway(provider_id: &str, err: RuntimeError) -> GatewayError {
    let class = match err {
        RuntimeError::DeviceBusy | RuntimeError::Network(_) => ErrorClass::ProviderUnavailable,
        RuntimeError::Timeout => ErrorClass::Timeout,
        RuntimeError::OutOfMemory => ErrorClass::Overloaded,
        RuntimeError::Validation(_) => ErrorClass::Validation,
        RuntimeError::Authorization => ErrorClass::Authorization,
        RuntimeError::NotFound(_) => ErrorClass::NotFound,
        RuntimeError::Invalid(_) => ErrorClass::Internal,
    };
    GatewayError::new(class, err.to_string(), provider_id)
}
