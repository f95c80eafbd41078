//! Plugin pipeline contract (spec §4.10).
//!
//! Grounded on `mofa-kernel::plugin` / `mofa-kernel::gateway::filter`: a
//! small capability trait plus a typed, explicitly-ordered registry — no
//! classpath/CDI scanning in the hot path, per the §9 design note.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::types::InferenceRequest;

/// Pipeline phases in dispatch order (spec §4.10). `Infer` is the core
/// orchestrator step itself and is never registered against by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    PreValidate,
    Validate,
    PreInfer,
    PostInfer,
    Finalize,
}

/// Mutable request-scoped state passed through the pipeline. Plugins read
/// and annotate it; only `VALIDATE`-and-earlier plugins may reject the
/// request outright.
pub struct PluginContext {
    pub request: InferenceRequest,
    pub response: Option<crate::types::InferenceResponse>,
    pub annotations: serde_json::Map<String, Value>,
}

impl PluginContext {
    pub fn new(request: InferenceRequest) -> Self {
        Self {
            request,
            response: None,
            annotations: serde_json::Map::new(),
        }
    }
}

/// A pipeline participant. `order` breaks ties within the same `phase`;
/// where two plugins share `(phase, order)` the §9 Open Question is
/// resolved by registration order (see DESIGN.md) — `PluginRegistry`
/// enforces this via a stable sort.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn phase(&self) -> Phase;
    fn order(&self) -> i32 {
        0
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Run the plugin. Returning `Err` halts the pipeline; the error
    /// becomes the request's error unless `on_failure` below converts it.
    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), GatewayError>;

    /// Called when any plugin in the pipeline fails (including this one).
    /// Returning `true` lets the pipeline continue past the failure.
    async fn on_failure(&self, _ctx: &PluginContext, _err: &GatewayError) -> bool {
        false
    }

    async fn shutdown(&self) {}
}

/// Typed, explicitly-ordered plugin registry. Static registration happens
/// at composition-root startup by constructing with a `Vec`; `register`
/// exists for the optional dynamic-registration path described in §9.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut registry = Self { plugins };
        registry.resort();
        registry
    }

    pub fn empty() -> Self {
        Self { plugins: Vec::new() }
    }

    /// Register a plugin at runtime. Registration order among
    /// already-registered plugins is preserved; the new plugin's position
    /// among same-`(phase, order)` peers is "last", matching the stable
    /// sort tie-break.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
        self.resort();
    }

    fn resort(&mut self) {
        // `sort_by` is a stable sort: plugins sharing (phase, order) keep
        // their relative registration order, resolving the tie-break the
        // Open Question in §9 leaves ambiguous in the source.
        self.plugins.sort_by(|a, b| {
            a.phase()
                .cmp(&b.phase())
                .then(a.order().cmp(&b.order()))
                .then(CmpOrdering::Equal)
        });
    }

    pub fn plugins_for(&self, phase: Phase) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter().filter(move |p| p.phase() == phase)
    }

    /// Run every plugin registered for `phase` in order. Stops at the
    /// first unrecovered failure.
    pub async fn run_phase(&self, phase: Phase, ctx: &mut PluginContext) -> Result<(), GatewayError> {
        for plugin in self.plugins_for(phase) {
            if let Err(err) = plugin.execute(ctx).await {
                if !plugin.on_failure(ctx, &err).await {
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::types::{InferenceRequest, Role};

    struct RecordingPlugin {
        name: &'static str,
        phase: Phase,
        order: i32,
        calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn phase(&self) -> Phase {
            self.phase
        }
        fn order(&self) -> i32 {
            self.order
        }
        async fn execute(&self, _ctx: &mut PluginContext) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest::builder("t1", "m1").message(Role::User, "hi").build()
    }

    #[tokio::test]
    async fn same_order_ties_break_by_registration_order() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = PluginRegistry::new(vec![
            Arc::new(RecordingPlugin { name: "first", phase: Phase::Validate, order: 5, calls: calls.clone() }),
            Arc::new(RecordingPlugin { name: "second", phase: Phase::Validate, order: 5, calls: calls.clone() }),
        ]);
        let mut ctx = PluginContext::new(request());
        registry.run_phase(Phase::Validate, &mut ctx).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn lower_order_runs_first_within_phase() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = PluginRegistry::new(vec![
            Arc::new(RecordingPlugin { name: "low", phase: Phase::PreValidate, order: 1, calls: calls.clone() }),
            Arc::new(RecordingPlugin { name: "high", phase: Phase::PreValidate, order: 10, calls: calls.clone() }),
        ]);
        let mut ctx = PluginContext::new(request());
        registry.run_phase(Phase::PreValidate, &mut ctx).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["low", "high"]);
    }

    struct FailingPlugin;
    #[async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }
        fn phase(&self) -> Phase {
            Phase::Validate
        }
        async fn execute(&self, _ctx: &mut PluginContext) -> Result<(), GatewayError> {
            Err(GatewayError::new(ErrorClass::UnsafeContent, "blocked", "failing"))
        }
    }

    #[tokio::test]
    async fn failure_halts_pipeline_when_on_failure_returns_false() {
        let registry = PluginRegistry::new(vec![Arc::new(FailingPlugin)]);
        let mut ctx = PluginContext::new(request());
        let result = registry.run_phase(Phase::Validate, &mut ctx).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().class, ErrorClass::UnsafeContent);
    }
}
