//! Composition root for the inference execution plane.
//!
//! Wires every component crate (`inferno-kernel`, `inferno-cache`,
//! `inferno-runtime`, `inferno-scheduler`, `inferno-jobs`, `inferno-quota`,
//! `inferno-plugins`, `inferno-observability`) into one `AppState`, and
//! exposes the non-HTTP entry points an external REST layer would call
//! (spec §6). Grounded on `mofa-gateway/src/{state,server}.rs`'s
//! single-`AppState`-built-once-in-main pattern.

pub mod error;
pub mod executor;
pub mod handlers;
pub mod job_executor;
pub mod router;
pub mod state;

pub use error::{ErrorClass, GatewayError, GatewayResult};
pub use router::GatewayRouter;
pub use state::AppState;
