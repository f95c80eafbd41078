//! SLI / error-budget burn rate (spec §10 ambient supplement).
//!
//! The teacher has no direct equivalent of this; it is built from scratch
//! in the teacher's idiom (request-volume window, `parking_lot::Mutex`
//! guarded counters) rather than a wall-clock window, mirroring
//! [`inferno_runtime::CircuitBreaker`]'s windowing choice so the two stay
//! consistent with each other.

use std::sync::atomic::{AtomicU64, Ordering};

/// A rolling window over the last `window_size` outcomes, exposing the
/// observed error rate and its burn rate against a target SLO.
pub struct SliTracker {
    target_success_ratio: f64,
    window_size: u64,
    total: AtomicU64,
    failures: AtomicU64,
}

impl SliTracker {
    pub fn new(target_success_ratio: f64, window_size: u64) -> Self {
        Self {
            target_success_ratio,
            window_size: window_size.max(1),
            total: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn record(&self, success: bool) {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        if total >= self.window_size * 2 {
            // Halve both counters to keep the window roughly bounded
            // without a ring buffer; preserves the ratio.
            self.total.fetch_sub(total / 2, Ordering::Relaxed);
            self.failures.fetch_sub(self.failures.load(Ordering::Relaxed) / 2, Ordering::Relaxed);
        }
    }

    pub fn observed_error_ratio(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.failures.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Burn rate = observed error ratio / allowed error ratio. A burn rate
    /// of 1.0 means the SLO's error budget is being consumed exactly as
    /// fast as its target allows; >1.0 means it's burning faster.
    pub fn burn_rate(&self) -> f64 {
        let allowed = 1.0 - self.target_success_ratio;
        if allowed <= 0.0 {
            return if self.observed_error_ratio() > 0.0 { f64::INFINITY } else { 0.0 };
        }
        self.observed_error_ratio() / allowed
    }

    pub fn is_burning_budget(&self, threshold: f64) -> bool {
        self.burn_rate() > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burn_rate_one_when_observed_matches_target() {
        let tracker = SliTracker::new(0.99, 100);
        for _ in 0..99 {
            tracker.record(true);
        }
        tracker.record(false);
        assert!((tracker.burn_rate() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn burn_rate_above_threshold_flags_budget_burn() {
        let tracker = SliTracker::new(0.99, 100);
        for _ in 0..90 {
            tracker.record(true);
        }
        for _ in 0..10 {
            tracker.record(false);
        }
        assert!(tracker.is_burning_budget(2.0));
    }

    #[test]
    fn all_successes_has_zero_burn_rate() {
        let tracker = SliTracker::new(0.99, 10);
        for _ in 0..10 {
            tracker.record(true);
        }
        assert_eq!(tracker.burn_rate(), 0.0);
    }
}
