//! Domain types, error taxonomy, config loading and plugin contracts shared
//! by every crate in the inference execution plane.
//!
//! `inferno-kernel` carries no network or native-call code — it is the
//! dependency-free vocabulary that `inferno-runtime`, `inferno-scheduler`,
//! `inferno-jobs`, `inferno-quota` and `inferno-plugins` all build on.

pub mod error;
pub mod plugin;
pub mod types;

#[cfg(feature = "config")]
pub mod config;

pub use error::{ErrorClass, GatewayError, GatewayResult, SuggestedAction};
pub use plugin::{Phase, Plugin, PluginContext, PluginRegistry};
pub use types::{
    FinishReason, InferenceRequest, InferenceRequestBuilder, InferenceResponse,
    InferenceStage, Message, ModelManifest, ProviderCapabilities, ProviderDescriptor,
    ProviderHealth, Role, StreamChunk,
};
