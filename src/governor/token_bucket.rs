//! Token-bucket rate limiter.
//!
//! One bucket per outbound provider (email, Stripe). Refills continuously at
//! `rate_per_sec`, burst capacity equal to `capacity`. `try_acquire` is
//! non-blocking: callers that fail to acquire either defer or — for the
//! batch workflows in this crate — log and count the item as failed rather
//! than queuing.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

struct BucketInner {
    tokens: f64,
    last_refill: Instant,
}

/// A single provider's token bucket. Cheaply cloneable — clones share state.
#[derive(Clone)]
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    inner: Arc<Mutex<BucketInner>>,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            rate_per_sec,
            capacity,
            inner: Arc::new(Mutex::new(BucketInner {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Refill based on elapsed time, then attempt to take `cost` tokens.
    /// Returns `true` if the tokens were taken.
    pub async fn try_acquire(&self, cost: f64) -> bool {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
        inner.tokens = (inner.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        inner.last_refill = now;

        if inner.tokens >= cost {
            inner.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Convenience: acquire a single token.
    pub async fn try_acquire_one(&self) -> bool {
        self.try_acquire(1.0).await
    }

    /// Current configured steady-state rate, for diagnostics/logging.
    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let bucket = TokenBucket::new(1.0, 5.0);
        for _ in 0..5 {
            assert!(bucket.try_acquire_one().await);
        }
        assert!(!bucket.try_acquire_one().await);
    }

    #[tokio::test]
    async fn zero_rate_never_admits_after_burst_exhausted() {
        let bucket = TokenBucket::new(0.0, 0.0);
        assert!(!bucket.try_acquire_one().await);
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = TokenBucket::new(100.0, 1.0);
        assert!(bucket.try_acquire_one().await);
        assert!(!bucket.try_acquire_one().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bucket.try_acquire_one().await);
    }
}
