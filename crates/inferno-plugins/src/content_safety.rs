//! Content safety plugin (spec §4.10 supplement).
//!
//! Grounded on `mofa-foundation::security::{keyword_moderator,regex_pii}`:
//! a configurable keyword denylist plus a small set of PII regexes, both
//! checked against the concatenated message content. Either match
//! surfaces `UnsafeContent` (spec §7) rather than a generic validation
//! error, since the suggested action differs (HumanReview vs Fallback).

use async_trait::async_trait;
use inferno_kernel::plugin::{Phase, Plugin, PluginContext};
use inferno_kernel::{ErrorClass, GatewayError};
use regex::Regex;

pub struct ContentSafetyPlugin {
    denylist: Vec<String>,
    pii_patterns: Vec<Regex>,
}

impl ContentSafetyPlugin {
    pub fn new(denylist: Vec<String>) -> Self {
        let pii_patterns = vec![
            // US social security number, loosely matched.
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            // Credit-card-shaped digit runs.
            Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap(),
        ];
        Self { denylist, pii_patterns }
    }

    fn content(ctx: &PluginContext) -> String {
        ctx.request.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n")
    }
}

impl Default for ContentSafetyPlugin {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Plugin for ContentSafetyPlugin {
    fn name(&self) -> &str {
        "content_safety"
    }

    fn phase(&self) -> Phase {
        Phase::Validate
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), GatewayError> {
        let content = Self::content(ctx);
        let lower = content.to_lowercase();

        if let Some(hit) = self.denylist.iter().find(|word| lower.contains(word.as_str())) {
            return Err(GatewayError::new(
                ErrorClass::UnsafeContent,
                format!("message contains denylisted term '{hit}'"),
                self.name(),
            ));
        }

        if self.pii_patterns.iter().any(|re| re.is_match(&content)) {
            return Err(GatewayError::new(
                ErrorClass::UnsafeContent,
                "message appears to contain personally identifiable information",
                self.name(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferno_kernel::{InferenceRequest, Role};

    fn ctx(content: &str) -> PluginContext {
        PluginContext::new(InferenceRequest::builder("t", "m").message(Role::User, content).build())
    }

    #[tokio::test]
    async fn denylisted_term_is_rejected() {
        let plugin = ContentSafetyPlugin::new(vec!["forbidden".into()]);
        let mut c = ctx("this is forbidden content");
        let err = plugin.execute(&mut c).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::UnsafeContent);
    }

    #[tokio::test]
    async fn ssn_shaped_text_is_rejected_as_pii() {
        let plugin = ContentSafetyPlugin::default();
        let mut c = ctx("my ssn is 123-45-6789");
        assert!(plugin.execute(&mut c).await.is_err());
    }

    #[tokio::test]
    async fn clean_content_passes() {
        let plugin = ContentSafetyPlugin::default();
        let mut c = ctx("what's the weather like today?");
        assert!(plugin.execute(&mut c).await.is_ok());
    }
}
