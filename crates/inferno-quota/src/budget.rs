//! Per-tenant daily token budget (spec §4.9, step 4).
//!
//! Grounded on `mofa-foundation::scheduler::budget`: an `AtomicU64` counter
//! per tenant reset by a `chrono`-dated rollover key, avoiding a background
//! timer — the counter only checks "is today's key the same as the
//! recorded one" on each call and resets inline when it isn't.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

struct Counter {
    day: chrono::NaiveDate,
    used: AtomicU64,
}

/// Tracks tokens consumed by a tenant against a daily budget. Rollover is
/// lazy: the first call on a new UTC day resets the counter rather than a
/// scheduled sweep.
pub struct DailyTokenBudget {
    limit: u64,
    counter: Mutex<Counter>,
}

impl DailyTokenBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            counter: Mutex::new(Counter {
                day: chrono::Utc::now().date_naive(),
                used: AtomicU64::new(0),
            }),
        }
    }

    fn roll_if_needed(&self) {
        let today = chrono::Utc::now().date_naive();
        let mut counter = self.counter.lock();
        if counter.day != today {
            counter.day = today;
            counter.used.store(0, Ordering::SeqCst);
        }
    }

    /// Returns `true` and records `tokens` against today's usage iff doing
    /// so keeps usage strictly below `limit` (spec §4.9: "rejection ≥
    /// budget").
    pub fn try_consume(&self, tokens: u64) -> bool {
        self.roll_if_needed();
        let counter = self.counter.lock();
        let used = counter.used.load(Ordering::SeqCst);
        if used + tokens >= self.limit {
            return false;
        }
        counter.used.fetch_add(tokens, Ordering::SeqCst);
        true
    }

    pub fn used_today(&self) -> u64 {
        self.roll_if_needed();
        self.counter.lock().used.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_at_or_above_limit() {
        let budget = DailyTokenBudget::new(100);
        assert!(budget.try_consume(99));
        assert!(!budget.try_consume(1)); // 99+1 = 100 >= 100 -> rejected
        assert_eq!(budget.used_today(), 99);
    }

    #[test]
    fn accumulates_across_calls() {
        let budget = DailyTokenBudget::new(100);
        assert!(budget.try_consume(40));
        assert!(budget.try_consume(40));
        assert_eq!(budget.used_today(), 80);
        assert!(!budget.try_consume(20));
    }
}
