//! Tenant admission gate composing rate limit, concurrency cap and daily
//! budget (spec §4.9, steps 1–4). Plugin phases (step 5) are
//! `inferno-plugins`'s concern; this module only covers the quota checks
//! that precede them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use inferno_kernel::{ErrorClass, GatewayError};
use thiserror::Error;

use crate::bucket::TokenBucket;
use crate::budget::DailyTokenBudget;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("rate limit exceeded for tenant '{tenant_id}'")]
    RateLimited { tenant_id: String },
    #[error("concurrency cap reached for tenant '{tenant_id}'")]
    ConcurrencyCapReached { tenant_id: String },
    #[error("daily token budget exhausted for tenant '{tenant_id}'")]
    BudgetExhausted { tenant_id: String },
}

impl From<QuotaError> for GatewayError {
    fn from(err: QuotaError) -> Self {
        let tenant_id = match &err {
            QuotaError::RateLimited { tenant_id }
            | QuotaError::ConcurrencyCapReached { tenant_id }
            | QuotaError::BudgetExhausted { tenant_id } => tenant_id.clone(),
        };
        GatewayError::new(ErrorClass::RateLimit, err.to_string(), tenant_id)
    }
}

/// A concurrency admission permit. Dropping it releases the tenant's
/// in-flight slot.
pub struct ConcurrencyPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-tenant quota registry (spec §4.9 steps 2–4). Tenant resolution
/// (step 1) happens upstream; this type receives an already-resolved
/// `tenant_id` ("default" when multitenancy is disabled).
pub struct QuotaAdmission {
    tenants: dashmap::DashMap<String, Arc<TenantQuotaEntry>>,
    default_rps: f64,
    default_concurrency: usize,
    default_daily_budget: u64,
}

struct TenantQuotaEntry {
    rate_limiter: TokenBucket,
    concurrency_cap: usize,
    in_flight: Arc<AtomicUsize>,
    daily_budget: DailyTokenBudget,
}

impl QuotaAdmission {
    pub fn new(default_rps: f64, default_concurrency: usize, default_daily_budget: u64) -> Self {
        Self {
            tenants: dashmap::DashMap::new(),
            default_rps,
            default_concurrency,
            default_daily_budget,
        }
    }

    pub fn configure_tenant(&self, tenant_id: impl Into<String>, rps: f64, concurrency: usize, daily_budget: u64) {
        self.tenants.insert(
            tenant_id.into(),
            Arc::new(TenantQuotaEntry {
                rate_limiter: TokenBucket::new(rps, rps),
                concurrency_cap: concurrency,
                in_flight: Arc::new(AtomicUsize::new(0)),
                daily_budget: DailyTokenBudget::new(daily_budget),
            }),
        );
    }

    fn entry(&self, tenant_id: &str) -> Arc<TenantQuotaEntry> {
        self.tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                Arc::new(TenantQuotaEntry {
                    rate_limiter: TokenBucket::new(self.default_rps, self.default_rps),
                    concurrency_cap: self.default_concurrency,
                    in_flight: Arc::new(AtomicUsize::new(0)),
                    daily_budget: DailyTokenBudget::new(self.default_daily_budget),
                })
            })
            .clone()
    }

    /// Runs steps 2–3 (rate limit, concurrency cap) and returns a permit
    /// that must be held for the duration of the request. The daily
    /// budget (step 4) is checked separately via [`Self::consume_tokens`]
    /// once the actual token count is known post-response.
    pub fn admit(&self, tenant_id: &str) -> Result<ConcurrencyPermit, QuotaError> {
        let entry = self.entry(tenant_id);

        if !entry.rate_limiter.try_acquire(1.0) {
            return Err(QuotaError::RateLimited { tenant_id: tenant_id.to_string() });
        }

        let current = entry.in_flight.fetch_add(1, Ordering::SeqCst);
        if current >= entry.concurrency_cap {
            entry.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(QuotaError::ConcurrencyCapReached { tenant_id: tenant_id.to_string() });
        }

        Ok(ConcurrencyPermit { in_flight: entry.in_flight.clone() })
    }

    /// Step 4: pre-check against the remaining daily budget for `tenant_id`
    /// before allowing the request onto the provider path, and record the
    /// tokens if admitted.
    pub fn consume_tokens(&self, tenant_id: &str, tokens: u64) -> Result<(), QuotaError> {
        let entry = self.entry(tenant_id);
        if entry.daily_budget.try_consume(tokens) {
            Ok(())
        } else {
            Err(QuotaError::BudgetExhausted { tenant_id: tenant_id.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_blocks_after_capacity_exhausted() {
        let quota = QuotaAdmission::new(1.0, 10, 1_000_000);
        assert!(quota.admit("t1").is_ok());
        assert!(matches!(quota.admit("t1"), Err(QuotaError::RateLimited { .. })));
    }

    #[test]
    fn concurrency_cap_releases_on_permit_drop() {
        let quota = QuotaAdmission::new(1000.0, 1, 1_000_000);
        let permit = quota.admit("t1").unwrap();
        assert!(matches!(quota.admit("t1"), Err(QuotaError::ConcurrencyCapReached { .. })));
        drop(permit);
        assert!(quota.admit("t1").is_ok());
    }

    #[test]
    fn budget_exhaustion_is_independent_of_concurrency() {
        let quota = QuotaAdmission::new(1000.0, 100, 50);
        quota.consume_tokens("t1", 40).unwrap();
        assert!(matches!(quota.consume_tokens("t1", 20), Err(QuotaError::BudgetExhausted { .. })));
    }

    #[test]
    fn per_tenant_state_is_isolated() {
        let quota = QuotaAdmission::new(1.0, 10, 1_000_000);
        assert!(quota.admit("t1").is_ok());
        assert!(quota.admit("t2").is_ok());
    }
}
