//! Provider registry & router (spec §4.3).
//!
//! The registry itself follows `mofa-gateway::backend::registry`'s
//! `InMemoryCapabilityRegistry` (register/lookup/list/deregister/update_health
//! over one map), swapped to a `DashMap` for lock-free concurrent reads
//! under load the way the rest of this workspace favors `dashmap` over a
//! `Mutex<HashMap>` for hot registries. Routing policy resolution is
//! grounded on `mofa-foundation::inference::routing::resolve` — a pure
//! function over `(request, candidates, health)` returning a decision enum,
//! generalized from that module's local/cloud split to the spec's
//! least-loaded-healthy-provider-for-model rule (§4.3).

use std::sync::atomic::{AtomicU64, Ordering};

use inferno_kernel::{InferenceRequest, ProviderDescriptor, ProviderHealth};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no provider registered for model '{model}'")]
    NoProviderForModel { model: String },
    #[error("all providers for model '{model}' are unhealthy")]
    AllProvidersUnhealthy { model: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub provider_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// Route to the healthy provider with the fewest requests routed to it
    /// so far (spec §4.3 default).
    LeastLoaded,
    /// Always route to the first healthy provider registered for the
    /// model, in registration order.
    RoundRobin,
}

struct Entry {
    descriptor: ProviderDescriptor,
    routed_count: AtomicU64,
}

/// Concurrent registry of providers keyed by id, with a secondary
/// model→provider-ids index for routing.
pub struct ProviderRegistry {
    providers: dashmap::DashMap<String, Entry>,
    by_model: dashmap::DashMap<String, Vec<String>>,
    strategy: RoutingStrategy,
}

impl ProviderRegistry {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            providers: dashmap::DashMap::new(),
            by_model: dashmap::DashMap::new(),
            strategy,
        }
    }

    pub fn register(&self, descriptor: ProviderDescriptor, models: &[String]) {
        let id = descriptor.id.clone();
        self.providers.insert(
            id.clone(),
            Entry {
                descriptor,
                routed_count: AtomicU64::new(0),
            },
        );
        for model in models {
            self.by_model.entry(model.clone()).or_default().push(id.clone());
        }
    }

    pub fn deregister(&self, provider_id: &str) {
        self.providers.remove(provider_id);
        for mut entry in self.by_model.iter_mut() {
            entry.value_mut().retain(|id| id != provider_id);
        }
    }

    pub fn update_health(&self, provider_id: &str, health: ProviderHealth) {
        if let Some(mut entry) = self.providers.get_mut(provider_id) {
            entry.descriptor.health = health;
        }
    }

    pub fn lookup(&self, provider_id: &str) -> Option<ProviderDescriptor> {
        self.providers.get(provider_id).map(|e| e.descriptor.clone())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve the provider to route `request` to, per the configured
    /// [`RoutingStrategy`]. Unhealthy providers are skipped; a
    /// [`ProviderHealth::Degraded`] provider is only chosen when no
    /// healthy one is available (spec §4.3).
    pub fn route(&self, request: &InferenceRequest) -> Result<RoutingDecision, RoutingError> {
        let candidates = self
            .by_model
            .get(&request.model)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        if candidates.is_empty() {
            return Err(RoutingError::NoProviderForModel {
                model: request.model.clone(),
            });
        }

        let mut healthy: Vec<&str> = Vec::new();
        let mut degraded: Vec<&str> = Vec::new();
        for id in &candidates {
            if let Some(entry) = self.providers.get(id.as_str()) {
                match entry.descriptor.health {
                    ProviderHealth::Healthy => healthy.push(id),
                    ProviderHealth::Degraded => degraded.push(id),
                    ProviderHealth::Unhealthy => {}
                }
            }
        }

        let pool = if !healthy.is_empty() { &healthy } else { &degraded };
        if pool.is_empty() {
            return Err(RoutingError::AllProvidersUnhealthy {
                model: request.model.clone(),
            });
        }

        let chosen = match self.strategy {
            RoutingStrategy::RoundRobin => pool[0],
            RoutingStrategy::LeastLoaded => pool
                .iter()
                .min_by_key(|id| {
                    self.providers
                        .get(**id)
                        .map(|e| e.routed_count.load(Ordering::Relaxed))
                        .unwrap_or(0)
                })
                .copied()
                .expect("pool is non-empty"),
        };

        if let Some(entry) = self.providers.get(chosen) {
            entry.routed_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(RoutingDecision {
            provider_id: chosen.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::ProviderCapabilities;

    fn descriptor(id: &str, health: ProviderHealth) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.to_string(),
            version: "1".to_string(),
            capabilities: ProviderCapabilities::default(),
            health,
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest::builder("t1", "llama-3-8b").build()
    }

    #[test]
    fn unknown_model_is_rejected() {
        let registry = ProviderRegistry::new(RoutingStrategy::LeastLoaded);
        assert_eq!(
            registry.route(&request()),
            Err(RoutingError::NoProviderForModel {
                model: "llama-3-8b".to_string()
            })
        );
    }

    #[test]
    fn least_loaded_prefers_provider_with_fewer_routed_requests() {
        let registry = ProviderRegistry::new(RoutingStrategy::LeastLoaded);
        registry.register(descriptor("p1", ProviderHealth::Healthy), &["llama-3-8b".to_string()]);
        registry.register(descriptor("p2", ProviderHealth::Healthy), &["llama-3-8b".to_string()]);

        let first = registry.route(&request()).unwrap();
        let second = registry.route(&request()).unwrap();
        assert_ne!(first.provider_id, second.provider_id);
    }

    #[test]
    fn unhealthy_providers_are_skipped_but_degraded_is_a_fallback() {
        let registry = ProviderRegistry::new(RoutingStrategy::LeastLoaded);
        registry.register(descriptor("p1", ProviderHealth::Unhealthy), &["m".to_string()]);
        registry.register(descriptor("p2", ProviderHealth::Degraded), &["m".to_string()]);
        let decision = registry
            .route(&InferenceRequest::builder("t1", "m").build())
            .unwrap();
        assert_eq!(decision.provider_id, "p2");
    }

    #[test]
    fn all_unhealthy_is_an_error() {
        let registry = ProviderRegistry::new(RoutingStrategy::LeastLoaded);
        registry.register(descriptor("p1", ProviderHealth::Unhealthy), &["m".to_string()]);
        assert_eq!(
            registry.route(&InferenceRequest::builder("t1", "m").build()),
            Err(RoutingError::AllProvidersUnhealthy { model: "m".to_string() })
        );
    }
}
