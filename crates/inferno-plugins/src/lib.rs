//! Built-in plugins for the request pipeline (spec §4.10 supplement).
//!
//! Dynamic plugin registration itself lives on `inferno_kernel::plugin::PluginRegistry`
//! (its `register` method); this crate only supplies the built-in plugin
//! implementations that get registered against it at composition-root startup.

pub mod content_safety;
pub mod cost_attribution;
pub mod schema_validation;

pub use content_safety::ContentSafetyPlugin;
pub use cost_attribution::{CostAttributionPlugin, ModelPricing};
pub use schema_validation::SchemaValidationPlugin;
