//! Re-exports the kernel's wire error taxonomy; the composition root does
//! not add its own error type so every component's `GatewayError` reaches
//! the (out-of-scope) REST layer unchanged.

pub use inferno_kernel::{ErrorClass, GatewayError, GatewayResult, SuggestedAction, WireError};
