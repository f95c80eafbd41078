//! Domain entities from spec §3.
//!
//! Every wire-facing type derives `Serialize`/`Deserialize` so the
//! (out-of-scope) REST layer and audit store can round-trip them without
//! reaching into the core, the way every DTO in `mofa-foundation::llm::types`
//! does.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Stage resolution outcome (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InferenceStage {
    Prefill,
    Decode,
    Combined,
    Unresolved,
}

impl Default for InferenceStage {
    fn default() -> Self {
        InferenceStage::Unresolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    Cancelled,
    Error,
}

/// Known inference parameters (spec §3). Unknown keys are preserved in
/// `extra` rather than rejected, matching the teacher's tolerant-DTO style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceParameters {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub seed: Option<i64>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// An inference request. Immutable once built — `inferno_stage` and
/// `prompt_token_count` are the only fields an orchestrator may attach
/// after admission, and it does so by producing a new value via
/// [`InferenceRequest::with_stage`] / [`InferenceRequest::with_prompt_tokens`],
/// never by mutating the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub request_id: String,
    pub tenant_id: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub parameters: InferenceParameters,
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub inference_stage: InferenceStage,
    #[serde(default)]
    pub prompt_token_count: u32,
}

impl InferenceRequest {
    pub fn builder(tenant_id: impl Into<String>, model: impl Into<String>) -> InferenceRequestBuilder {
        InferenceRequestBuilder::new(tenant_id, model)
    }

    pub fn with_stage(&self, stage: InferenceStage) -> Self {
        let mut next = self.clone();
        next.inference_stage = stage;
        next
    }

    pub fn with_prompt_tokens(&self, prompt_token_count: u32) -> Self {
        let mut next = self.clone();
        next.prompt_token_count = prompt_token_count;
        next
    }

    /// Cheap prompt-token approximation used before a tokenizer is available
    /// (spec §4.6: promptTokens ≈ totalCharacters/4).
    pub fn approximate_prompt_tokens(&self) -> u32 {
        let chars: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        ((chars as f64) / 4.0).ceil() as u32
    }
}

/// Chained-builder constructor for [`InferenceRequest`], following the
/// teacher's Lombok-replacement idiom: immutable value types with
/// `with*`/builder construction rather than mutable beans.
pub struct InferenceRequestBuilder {
    request_id: String,
    tenant_id: String,
    model: String,
    messages: Vec<Message>,
    parameters: InferenceParameters,
    tools: Option<Value>,
    streaming: bool,
    priority: i32,
}

impl InferenceRequestBuilder {
    pub fn new(tenant_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            model: model.into(),
            messages: Vec::new(),
            parameters: InferenceParameters::default(),
            tools: None,
            streaming: false,
            priority: 0,
        }
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn message(mut self, role: Role, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
        self
    }

    pub fn parameters(mut self, parameters: InferenceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> InferenceRequest {
        InferenceRequest {
            request_id: self.request_id,
            tenant_id: self.tenant_id,
            model: self.model,
            messages: self.messages,
            parameters: self.parameters,
            tools: self.tools,
            streaming: self.streaming,
            priority: self.priority,
            inference_stage: InferenceStage::Unresolved,
            prompt_token_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub request_id: String,
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration_ms: u64,
    pub finish_reason: FinishReason,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub request_id: String,
    pub sequence_number: u64,
    pub delta: String,
    pub is_complete: bool,
    #[serde(default)]
    pub tool_call_delta: Option<Value>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFormat {
    Gguf,
    PyTorch,
    SafeTensors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub uri: String,
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub min_memory_mb: u64,
    pub preferred_device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub model_id: String,
    pub display_name: String,
    pub version: String,
    pub tenant_id: String,
    pub artifacts: HashMap<ModelFormat, ArtifactRef>,
    pub resource_requirements: ResourceRequirements,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub multimodal: bool,
    pub embeddings: bool,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub supported_formats: Vec<ModelFormat>,
    pub supported_devices: Vec<String>,
    pub supported_models: Vec<String>,
    pub supported_languages: Vec<String>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub version: String,
    pub capabilities: ProviderCapabilities,
    pub health: ProviderHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_unresolved_stage_and_zero_prompt_tokens() {
        let req = InferenceRequest::builder("t1", "llama-3-8b")
            .message(Role::User, "Hi")
            .build();
        assert_eq!(req.inference_stage, InferenceStage::Unresolved);
        assert_eq!(req.prompt_token_count, 0);
    }

    #[test]
    fn with_stage_does_not_mutate_original() {
        let req = InferenceRequest::builder("t1", "llama-3-8b").build();
        let staged = req.with_stage(InferenceStage::Combined);
        assert_eq!(req.inference_stage, InferenceStage::Unresolved);
        assert_eq!(staged.inference_stage, InferenceStage::Combined);
    }

    #[test]
    fn approximate_prompt_tokens_matches_scenario_2() {
        // spec §8 scenario 2: a 72-character prompt ≈ 18 tokens.
        let content: String = "a".repeat(72);
        let req = InferenceRequest::builder("t1", "llama-3-8b")
            .message(Role::User, content)
            .build();
        assert_eq!(req.approximate_prompt_tokens(), 18);
    }

    #[test]
    fn round_trips_through_json() {
        let req = InferenceRequest::builder("t1", "llama-3-8b")
            .message(Role::User, "Hi")
            .build();
        let json = serde_json::to_string(&req).unwrap();
        let back: InferenceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_id, req.request_id);
        assert_eq!(back.tenant_id, req.tenant_id);
    }
}
