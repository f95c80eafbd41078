//! Cost attribution plugin (spec §4.10 supplement, §3 cost sub-map).
//!
//! Grounded on the teacher's `pricing.rs` pattern: a per-model cost table
//! (`promptCostPerMillion`, `completionCostPerMillion`) consulted once
//! token counts are known, writing `promptCostUsd`/`completionCostUsd`/
//! `totalCostUsd` into the response's annotation map the way §3 describes
//! the cost sub-map being populated post-hoc.

use async_trait::async_trait;
use inferno_kernel::plugin::{Phase, Plugin, PluginContext};
use inferno_kernel::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub prompt_cost_per_million: f64,
    pub completion_cost_per_million: f64,
}

pub struct CostAttributionPlugin {
    pricing: dashmap::DashMap<String, ModelPricing>,
    default_pricing: ModelPricing,
}

impl CostAttributionPlugin {
    pub fn new(default_pricing: ModelPricing) -> Self {
        Self {
            pricing: dashmap::DashMap::new(),
            default_pricing,
        }
    }

    pub fn set_pricing(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.pricing.insert(model.into(), pricing);
    }

    fn pricing_for(&self, model: &str) -> ModelPricing {
        self.pricing.get(model).map(|p| *p).unwrap_or(self.default_pricing)
    }
}

impl Default for CostAttributionPlugin {
    fn default() -> Self {
        Self::new(ModelPricing {
            prompt_cost_per_million: 0.0,
            completion_cost_per_million: 0.0,
        })
    }
}

#[async_trait]
impl Plugin for CostAttributionPlugin {
    fn name(&self) -> &str {
        "cost_attribution"
    }

    fn phase(&self) -> Phase {
        Phase::PostInfer
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), GatewayError> {
        let Some(response) = &ctx.response else {
            return Ok(());
        };

        let pricing = self.pricing_for(&response.model);
        let prompt_cost = response.prompt_tokens as f64 / 1_000_000.0 * pricing.prompt_cost_per_million;
        let completion_cost = response.completion_tokens as f64 / 1_000_000.0 * pricing.completion_cost_per_million;

        ctx.annotations.insert("promptCostUsd".to_string(), serde_json::json!(prompt_cost));
        ctx.annotations.insert("completionCostUsd".to_string(), serde_json::json!(completion_cost));
        ctx.annotations.insert("totalCostUsd".to_string(), serde_json::json!(prompt_cost + completion_cost));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::{FinishReason, InferenceRequest, InferenceResponse};

    fn ctx_with_response(prompt_tokens: u32, completion_tokens: u32) -> PluginContext {
        let mut ctx = PluginContext::new(InferenceRequest::builder("t", "gpt-x").build());
        ctx.response = Some(InferenceResponse {
            request_id: "r1".into(),
            content: "hi".into(),
            model: "gpt-x".into(),
            tokens_used: prompt_tokens + completion_tokens,
            prompt_tokens,
            completion_tokens,
            duration_ms: 10,
            finish_reason: FinishReason::Stop,
            timestamp: chrono::Utc::now(),
            metadata: Default::default(),
        });
        ctx
    }

    #[tokio::test]
    async fn computes_cost_from_configured_pricing() {
        let plugin = CostAttributionPlugin::new(ModelPricing {
            prompt_cost_per_million: 1.0,
            completion_cost_per_million: 2.0,
        });
        let mut ctx = ctx_with_response(1_000_000, 500_000);
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.annotations.get("promptCostUsd").unwrap(), &serde_json::json!(1.0));
        assert_eq!(ctx.annotations.get("completionCostUsd").unwrap(), &serde_json::json!(1.0));
        assert_eq!(ctx.annotations.get("totalCostUsd").unwrap(), &serde_json::json!(2.0));
    }

    #[tokio::test]
    async fn per_model_override_takes_precedence() {
        let plugin = CostAttributionPlugin::default();
        plugin.set_pricing("gpt-x", ModelPricing { prompt_cost_per_million: 5.0, completion_cost_per_million: 0.0 });
        let mut ctx = ctx_with_response(1_000_000, 0);
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.annotations.get("promptCostUsd").unwrap(), &serde_json::json!(5.0));
    }

    #[tokio::test]
    async fn no_response_yet_is_a_noop() {
        let plugin = CostAttributionPlugin::default();
        let mut ctx = PluginContext::new(InferenceRequest::builder("t", "m").build());
        assert!(plugin.execute(&mut ctx).await.is_ok());
    }
}
