//! Schema validation plugin (spec §4.10 supplement).
//!
//! Grounded on `mofa-foundation::schema_validator`: checks the request's
//! message/parameter shape against the invariants spec §3 states directly
//! (non-empty `messages`, `temperature`/`top_p` within range) rather than
//! a general JSON-schema engine, since the domain model is fixed and known
//! at compile time.

use async_trait::async_trait;
use inferno_kernel::{ErrorClass, GatewayError};
use inferno_kernel::plugin::{Phase, Plugin, PluginContext};

pub struct SchemaValidationPlugin;

#[async_trait]
impl Plugin for SchemaValidationPlugin {
    fn name(&self) -> &str {
        "schema_validation"
    }

    fn phase(&self) -> Phase {
        Phase::PreValidate
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), GatewayError> {
        let request = &ctx.request;

        if request.messages.is_empty() {
            return Err(GatewayError::new(ErrorClass::Validation, "messages must not be empty", self.name()));
        }

        if let Some(temperature) = request.parameters.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(GatewayError::new(
                    ErrorClass::Validation,
                    format!("temperature {temperature} out of range [0.0, 2.0]"),
                    self.name(),
                ));
            }
        }

        if let Some(top_p) = request.parameters.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(GatewayError::new(
                    ErrorClass::Validation,
                    format!("top_p {top_p} out of range [0.0, 1.0]"),
                    self.name(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::{InferenceParameters, InferenceRequest, Role};

    fn ctx_with(params: InferenceParameters) -> PluginContext {
        let request = InferenceRequest::builder("t", "m")
            .message(Role::User, "hi")
            .parameters(params)
            .build();
        PluginContext::new(request)
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let plugin = SchemaValidationPlugin;
        let request = InferenceRequest::builder("t", "m").build();
        let mut ctx = PluginContext::new(request);
        assert!(plugin.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_temperature_is_rejected() {
        let plugin = SchemaValidationPlugin;
        let mut ctx = ctx_with(InferenceParameters { temperature: Some(5.0), ..Default::default() });
        assert!(plugin.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn valid_request_passes() {
        let plugin = SchemaValidationPlugin;
        let mut ctx = ctx_with(InferenceParameters { temperature: Some(0.7), top_p: Some(0.9), ..Default::default() });
        assert!(plugin.execute(&mut ctx).await.is_ok());
    }
}
