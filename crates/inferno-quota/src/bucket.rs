//! Token bucket rate limiter (spec §4.9, step 2).
//!
//! Grounded on `mofa-foundation::validation::rate_limiter`: capacity +
//! refill-rate fields, last-refill instant under a `parking_lot::Mutex`,
//! a non-async CPU-only critical section for the bucket check (no await
//! inside the lock).

use std::time::Instant;

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-tenant token bucket: `capacity` tokens, refilled at `refill_per_sec`
/// tokens/second. `try_acquire(n)` is non-blocking — it fails immediately
/// rather than waiting for tokens, matching spec §4.9's "failures return
/// immediately" admission rule.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    inner: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            inner: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn try_acquire(&self, n: f64) -> bool {
        let mut bucket = self.inner.lock();
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= n {
            bucket.tokens -= n;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> f64 {
        let bucket = self.inner.lock();
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_up_to_capacity_then_rejects() {
        let bucket = TokenBucket::new(2.0, 1.0);
        assert!(bucket.try_acquire(1.0));
        assert!(bucket.try_acquire(1.0));
        assert!(!bucket.try_acquire(1.0));
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(1.0, 1000.0);
        assert!(bucket.try_acquire(1.0));
        assert!(!bucket.try_acquire(1.0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(bucket.try_acquire(1.0));
    }
}
