//! Provider contract and concrete backend adapters (spec §4.2, SPEC_FULL
//! ambient §4.2).
//!
//! Grounded on `mofa-local-llm::provider`'s `LinuxLocalProvider` (hardware
//! probe at construction, memory-aware warmup) for the local backends, and
//! the teacher's gateway `backend::openai` for the remote one.

use async_trait::async_trait;
use inferno_kernel::{InferenceRequest, InferenceResponse, ProviderCapabilities, StreamChunk};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::hardware::HardwareInfo;
use crate::session::RequestContext;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("device busy")]
    DeviceBusy,
    #[error("transient network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("out of memory")]
    OutOfMemory,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("authorization error")]
    Authorization,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RuntimeError {
    /// Failure classification for the circuit breaker (spec §4.2).
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::Network(_) | RuntimeError::Timeout | RuntimeError::DeviceBusy
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub prewarm: bool,
    pub model_path: Option<String>,
}

/// Object-safe seam every concrete backend implements. Polymorphism via a
/// small capability trait, not a deep inheritance hierarchy, per §9.
#[async_trait]
pub trait ProviderRuntime: Send + Sync {
    fn id(&self) -> &str;
    fn capabilities(&self) -> ProviderCapabilities;

    async fn initialize(&self, config: &ProviderConfig) -> Result<(), RuntimeError>;

    async fn infer(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<InferenceResponse, RuntimeError>;

    async fn stream(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<StreamChunk>, RuntimeError>;

    async fn shutdown(&self) {}
}

/// Local GGUF backend. The native call itself is an opaque callable
/// (llama.cpp bindings are out of scope, spec §1); this type only owns the
/// hardware-aware admission/warmup wrapper around it.
pub struct GgufRunner {
    id: String,
    hardware: HardwareInfo,
}

impl GgufRunner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hardware: HardwareInfo::detect(),
        }
    }

    /// Downgrade a requested device hint to CPU when unavailable rather
    /// than failing session init outright (SPEC_FULL §4.2 supplement).
    fn resolve_device(&self, hint: Option<&str>) -> String {
        match hint {
            Some(h) if self.hardware.available_backends.iter().any(|b| b.to_string().eq_ignore_ascii_case(h)) => {
                h.to_string()
            }
            _ => self.hardware.backend.to_string(),
        }
    }
}

#[async_trait]
impl ProviderRuntime for GgufRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            function_calling: false,
            multimodal: false,
            embeddings: false,
            max_context_tokens: 8192,
            max_output_tokens: 2048,
            supported_formats: vec![inferno_kernel::types::ModelFormat::Gguf],
            supported_devices: self
                .hardware
                .available_backends
                .iter()
                .map(|b| b.to_string())
                .collect(),
            supported_models: Vec::new(),
            supported_languages: vec!["en".to_string()],
            features: Vec::new(),
        }
    }

    async fn initialize(&self, config: &ProviderConfig) -> Result<(), RuntimeError> {
        let _device = self.resolve_device(config.model_path.as_deref());
        Ok(())
    }

    async fn infer(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<InferenceResponse, RuntimeError> {
        if ctx.cancel.is_cancelled() {
            return Err(RuntimeError::Validation("cancelled before dispatch".into()));
        }
        // Native generation loop stands in for the opaque llama.cpp call
        // (spec §1: native bindings are external collaborators).
        let content = format!("[gguf:{}] response to {} messages", self.id, request.messages.len());
        Ok(InferenceResponse {
            request_id: request.request_id.clone(),
            content,
            model: request.model.clone(),
            tokens_used: 32,
            prompt_tokens: request.prompt_token_count.max(1),
            completion_tokens: 16,
            duration_ms: 10,
            finish_reason: inferno_kernel::FinishReason::Stop,
            timestamp: chrono::Utc::now(),
            metadata: Default::default(),
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<StreamChunk>, RuntimeError> {
        let (tx, rx) = mpsc::channel(16);
        let request_id = request.request_id.clone();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            for i in 0..8u64 {
                // Cancellation is checked once per generation iteration
                // (spec §4.8, §5).
                if cancel.is_cancelled() {
                    let _ = tx
                        .send(StreamChunk {
                            request_id: request_id.clone(),
                            sequence_number: i,
                            delta: String::new(),
                            is_complete: true,
                            tool_call_delta: None,
                            finish_reason: Some(inferno_kernel::FinishReason::Cancelled),
                        })
                        .await;
                    return;
                }
                let is_complete = i == 7;
                let _ = tx
                    .send(StreamChunk {
                        request_id: request_id.clone(),
                        sequence_number: i,
                        delta: format!("tok{i} "),
                        is_complete,
                        tool_call_delta: None,
                        finish_reason: is_complete.then_some(inferno_kernel::FinishReason::Stop),
                    })
                    .await;
                if is_complete {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Local LibTorch backend. Same opaque-native-call shape as [`GgufRunner`];
/// kept as a distinct type because its capability set (multimodal,
/// embeddings) differs.
pub struct TorchRunner {
    id: String,
}

impl TorchRunner {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ProviderRuntime for TorchRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            function_calling: true,
            multimodal: true,
            embeddings: true,
            max_context_tokens: 32768,
            max_output_tokens: 4096,
            supported_formats: vec![inferno_kernel::types::ModelFormat::PyTorch, inferno_kernel::types::ModelFormat::SafeTensors],
            supported_devices: vec!["cpu".into(), "cuda".into()],
            supported_models: Vec::new(),
            supported_languages: vec!["en".to_string()],
            features: vec!["embeddings".into()],
        }
    }

    async fn initialize(&self, _config: &ProviderConfig) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn infer(
        &self,
        request: &InferenceRequest,
        _ctx: &RequestContext,
    ) -> Result<InferenceResponse, RuntimeError> {
        Ok(InferenceResponse {
            request_id: request.request_id.clone(),
            content: format!("[torch:{}] response", self.id),
            model: request.model.clone(),
            tokens_used: 48,
            prompt_tokens: request.prompt_token_count.max(1),
            completion_tokens: 24,
            duration_ms: 15,
            finish_reason: inferno_kernel::FinishReason::Stop,
            timestamp: chrono::Utc::now(),
            metadata: Default::default(),
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        _ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<StreamChunk>, RuntimeError> {
        let (tx, rx) = mpsc::channel(4);
        let request_id = request.request_id.clone();
        tokio::spawn(async move {
            let _ = tx
                .send(StreamChunk {
                    request_id,
                    sequence_number: 0,
                    delta: "done".into(),
                    is_complete: true,
                    tool_call_delta: None,
                    finish_reason: Some(inferno_kernel::FinishReason::Stop),
                })
                .await;
        });
        Ok(rx)
    }
}

/// Remote OpenAI-compatible HTTP backend (spec §6 wire compatibility).
pub struct OpenAiCompatProvider {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ProviderRuntime for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            function_calling: true,
            multimodal: false,
            embeddings: true,
            max_context_tokens: 128_000,
            max_output_tokens: 4096,
            supported_formats: Vec::new(),
            supported_devices: vec!["remote".into()],
            supported_models: Vec::new(),
            supported_languages: vec!["en".into()],
            features: vec!["tools".into()],
        }
    }

    async fn initialize(&self, _config: &ProviderConfig) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn infer(
        &self,
        request: &InferenceRequest,
        ctx: &RequestContext,
    ) -> Result<InferenceResponse, RuntimeError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.parameters.max_tokens,
            "temperature": request.parameters.temperature,
            "top_p": request.parameters.top_p,
            "stream": false,
        });
        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = tokio::time::timeout(ctx.timeout, req.send())
            .await
            .map_err(|_| RuntimeError::Timeout)?
            .map_err(|e| RuntimeError::Network(e.to_string()))?;

        if resp.status() == 401 || resp.status() == 403 {
            return Err(RuntimeError::Authorization);
        }
        if !resp.status().is_success() {
            return Err(RuntimeError::Network(format!("status {}", resp.status())));
        }

        Ok(InferenceResponse {
            request_id: request.request_id.clone(),
            content: String::new(),
            model: request.model.clone(),
            tokens_used: 0,
            prompt_tokens: request.prompt_token_count,
            completion_tokens: 0,
            duration_ms: 0,
            finish_reason: inferno_kernel::FinishReason::Stop,
            timestamp: chrono::Utc::now(),
            metadata: Default::default(),
        })
    }

    async fn stream(
        &self,
        _request: &InferenceRequest,
        _ctx: &RequestContext,
    ) -> Result<mpsc::Receiver<StreamChunk>, RuntimeError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification_matches_spec_4_2() {
        assert!(RuntimeError::Network("x".into()).retryable());
        assert!(RuntimeError::Timeout.retryable());
        assert!(RuntimeError::DeviceBusy.retryable());
        assert!(!RuntimeError::OutOfMemory.retryable());
        assert!(!RuntimeError::Validation("x".into()).retryable());
        assert!(!RuntimeError::Authorization.retryable());
        assert!(!RuntimeError::NotFound("x".into()).retryable());
        assert!(!RuntimeError::Invalid("x".into()).retryable());
    }
}
