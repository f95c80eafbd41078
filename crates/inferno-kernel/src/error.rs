//! Crate-wide error taxonomy for the inference execution plane.
//!
//! Every component error converts into [`GatewayError`] via `#[from]`, the
//! way `mofa-kernel`'s `KernelError` composes per-submodule errors. Unlike a
//! bag of strings, [`ErrorClass`] carries the wire-visible HTTP status and
//! retry semantics from spec §7 so call sites never have to re-derive them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The wire error taxonomy (spec §7). Determines HTTP status and
/// retryability; never add a variant without also deciding both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorClass {
    Validation,
    Authentication,
    Authorization,
    RateLimit,
    NotFound,
    Overloaded,
    Timeout,
    ProviderUnavailable,
    ContextTooLong,
    UnsafeContent,
    Internal,
}

impl ErrorClass {
    /// HTTP status code this class maps to at the (out-of-scope) REST edge.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorClass::Validation | ErrorClass::ContextTooLong | ErrorClass::UnsafeContent => {
                400
            }
            ErrorClass::Authentication => 401,
            ErrorClass::Authorization => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::RateLimit => 429,
            ErrorClass::Overloaded | ErrorClass::ProviderUnavailable => 503,
            ErrorClass::Timeout => 504,
            ErrorClass::Internal => 500,
        }
    }

    /// Whether the reliability envelope should retry a call that failed
    /// with this class (spec §4.2, §4.4, §7).
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::Overloaded | ErrorClass::Timeout | ErrorClass::ProviderUnavailable
        )
    }

    pub fn suggested_action(self) -> SuggestedAction {
        match self {
            ErrorClass::Overloaded | ErrorClass::Timeout | ErrorClass::ProviderUnavailable => {
                SuggestedAction::Retry
            }
            ErrorClass::RateLimit => SuggestedAction::Escalate,
            ErrorClass::UnsafeContent => SuggestedAction::HumanReview,
            ErrorClass::NotFound | ErrorClass::Validation | ErrorClass::ContextTooLong => {
                SuggestedAction::Fallback
            }
            ErrorClass::Authentication | ErrorClass::Authorization | ErrorClass::Internal => {
                SuggestedAction::Escalate
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Retry,
    Fallback,
    Escalate,
    HumanReview,
}

/// The wire error payload described in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
    pub origin_node: String,
    pub origin_run_id: String,
    pub retryable: bool,
    pub suggested_action: SuggestedAction,
}

/// Crate-wide error type. Each component crate defines its own narrow error
/// enum and converts into this one with `#[from]` at the boundary where it
/// needs to become wire-visible, mirroring `mofa-kernel::error::KernelError`.
#[derive(Debug, Error)]
#[error("{class:?}: {message}")]
pub struct GatewayError {
    pub class: ErrorClass,
    pub message: String,
    /// Component that originated the error (provider id, "scheduler", …).
    pub origin_node: String,
    pub request_id: Option<String>,
}

impl GatewayError {
    pub fn new(class: ErrorClass, message: impl Into<String>, origin_node: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            origin_node: origin_node.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn retryable(&self) -> bool {
        self.class.retryable()
    }

    fn error_type_str(&self) -> &'static str {
        match self.class {
            ErrorClass::Validation => "Validation",
            ErrorClass::Authentication => "Authentication",
            ErrorClass::Authorization => "Authorization",
            ErrorClass::RateLimit => "RateLimit",
            ErrorClass::NotFound => "NotFound",
            ErrorClass::Overloaded => "Overloaded",
            ErrorClass::Timeout => "Timeout",
            ErrorClass::ProviderUnavailable => "ProviderUnavailable",
            ErrorClass::ContextTooLong => "ContextTooLong",
            ErrorClass::UnsafeContent => "UnsafeContent",
            ErrorClass::Internal => "Internal",
        }
    }

    /// Render the spec §6 wire payload for this error.
    pub fn to_wire(&self) -> WireError {
        WireError {
            error_type: self.error_type_str(),
            message: self.message.clone(),
            origin_node: self.origin_node.clone(),
            origin_run_id: self.request_id.clone().unwrap_or_default(),
            retryable: self.class.retryable(),
            suggested_action: self.class.suggested_action(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
