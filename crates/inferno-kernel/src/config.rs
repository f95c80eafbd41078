//! Configuration loading.
//!
//! Grounded on `mofa-kernel::config`: format auto-detection from file
//! extension, `${VAR}`/`$VAR` environment substitution via `regex`, merged
//! with environment-variable overrides through the `config` crate's
//! `Environment` source. One [`GatewayConfig`] is the single source of
//! truth built by the composition root; no component re-reads environment
//! variables directly.

use config::{Config as Cfg, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Parse(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchedulerStrategy {
    Static,
    Dynamic,
    Continuous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub strategy: SchedulerStrategy,
    pub max_batch_size: usize,
    pub max_wait_time_ms: u64,
    pub max_concurrent_batches: usize,
    pub small_prompt_threshold: u32,
    pub disaggregation: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulerStrategy::Dynamic,
            max_batch_size: 8,
            max_wait_time_ms: 50,
            max_concurrent_batches: 4,
            small_prompt_threshold: 32,
            disaggregation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvCacheConfig {
    pub block_size: usize,
    pub total_blocks: usize,
    pub hidden_dim: usize,
    pub head_count: usize,
    pub element_bytes: usize,
}

impl Default for KvCacheConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            total_blocks: 4096,
            hidden_dim: 4096,
            head_count: 32,
            element_bytes: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub request_volume_threshold: u32,
    pub failure_ratio: f64,
    pub delay_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 20,
            failure_ratio: 0.5,
            delay_ms: 30_000,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuotaConfig {
    pub tenant_id: String,
    pub rps: f64,
    pub concurrent: usize,
    pub daily_token_budget: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    pub id: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub prewarm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    pub scheduler: SchedulerConfig,
    pub kvcache: KvCacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub quota: Vec<TenantQuotaConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderEndpointConfig>,
}

// manual Default impls for the inner structs above already cover the
// non-container fields; `#[derive(Default)]` on GatewayConfig needs them.
impl Default for SchedulerStrategy {
    fn default() -> Self {
        SchedulerStrategy::Dynamic
    }
}

/// Substitute `${VAR}` / `$VAR` references with process environment values,
/// leaving unresolved references untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let substituted = braced
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();
    let bare = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
    bare.replace_all(&substituted, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Load [`GatewayConfig`] from an optional file path, merged with
/// `INFERNO_`-prefixed environment variable overrides (e.g.
/// `INFERNO_SCHEDULER__MAX_BATCH_SIZE=16`).
pub fn load_config(path: Option<&str>) -> ConfigResult<GatewayConfig> {
    let mut builder = Cfg::builder();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);
        builder = builder.add_source(File::from_str(&substituted, config::FileFormat::Yaml));
    }
    builder = builder.add_source(Environment::with_prefix("INFERNO").separator("__"));

    let cfg = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.try_deserialize()
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.circuit_breaker.request_volume_threshold, 20);
        assert_eq!(cfg.circuit_breaker.failure_ratio, 0.5);
        assert_eq!(cfg.circuit_breaker.delay_ms, 30_000);
        assert_eq!(cfg.circuit_breaker.success_threshold, 3);
    }

    #[test]
    fn substitutes_braced_and_bare_env_vars() {
        std::env::set_var("INFERNO_TEST_VAR", "hello");
        assert_eq!(substitute_env_vars("x: ${INFERNO_TEST_VAR}"), "x: hello");
        assert_eq!(substitute_env_vars("x: $INFERNO_TEST_VAR"), "x: hello");
    }
}
