//! Rate Governor — token-bucket pacing plus circuit breaking per outbound provider.
//!
//! One [`CircuitBreaker`] and one [`TokenBucket`] per provider, shared across
//! every worker of the process. A governed call is
//! the composition `breaker.run(|| { limiter.try_acquire(); do_call() })`.

pub mod circuit_breaker;
pub mod token_bucket;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use token_bucket::TokenBucket;

use crate::errors::BatchError;

/// Identifies an outbound provider the governor paces and protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Stripe,
    Email,
    ObjectStorage,
}

impl Provider {
    fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Email => "email",
            Provider::ObjectStorage => "object_storage",
        }
    }
}

struct Lane {
    bucket: TokenBucket,
    breaker: CircuitBreaker,
}

/// Process-wide rate governor: one lane (bucket + breaker) per [`Provider`].
pub struct RateGovernor {
    lanes: RwLock<HashMap<Provider, Lane>>,
}

impl RateGovernor {
    /// Construct with the default lanes: SES ~200/s, Stripe ~10/s (the
    /// 100/s cap is respected via the explicit per-call delay in the
    /// fee/tax backfiller; the bucket rate models the *intended* steady pace).
    pub fn new(email_rate_per_sec: f64, stripe_rate_per_sec: f64) -> Self {
        let mut lanes = HashMap::new();
        lanes.insert(
            Provider::Email,
            Lane {
                // Burst capacity equals the steady rate — a 0/s rate must
                // therefore admit nothing, not even one call.
                bucket: TokenBucket::new(email_rate_per_sec, email_rate_per_sec),
                breaker: CircuitBreaker::new("email", CircuitBreakerConfig::default()),
            },
        );
        lanes.insert(
            Provider::Stripe,
            Lane {
                bucket: TokenBucket::new(stripe_rate_per_sec, stripe_rate_per_sec),
                breaker: CircuitBreaker::new("stripe", CircuitBreakerConfig::default()),
            },
        );
        lanes.insert(
            Provider::ObjectStorage,
            Lane {
                bucket: TokenBucket::new(50.0, 50.0),
                breaker: CircuitBreaker::new("object_storage", CircuitBreakerConfig::default()),
            },
        );
        Self {
            lanes: RwLock::new(lanes),
        }
    }

    /// `true` if a token was acquired for `provider` right now (non-blocking).
    pub async fn try_acquire(&self, provider: Provider) -> bool {
        let lanes = self.lanes.read().await;
        match lanes.get(&provider) {
            Some(lane) => lane.bucket.try_acquire_one().await,
            None => true,
        }
    }

    pub async fn breaker_allows(&self, provider: Provider) -> bool {
        let lanes = self.lanes.read().await;
        match lanes.get(&provider) {
            Some(lane) => lane.breaker.is_allowed().await,
            None => true,
        }
    }

    pub async fn record_success(&self, provider: Provider) {
        let lanes = self.lanes.read().await;
        if let Some(lane) = lanes.get(&provider) {
            lane.breaker.record_success().await;
        }
    }

    pub async fn record_failure(&self, provider: Provider) {
        let lanes = self.lanes.read().await;
        if let Some(lane) = lanes.get(&provider) {
            lane.breaker.record_failure().await;
        }
    }

    pub async fn circuit_state(&self, provider: Provider) -> CircuitState {
        let lanes = self.lanes.read().await;
        match lanes.get(&provider) {
            Some(lane) => lane.breaker.state().await,
            None => CircuitState::Closed,
        }
    }

    /// Run a governed call: checks the breaker, then the token bucket, then
    /// calls `f`, recording the outcome on the breaker.
    ///
    /// Returns `Err(BatchError::ProviderUnavailable)` if the breaker is open,
    /// or `Err(BatchError::ProviderTransient)` if the bucket has no tokens
    /// (the caller decides whether that counts as failed or is dropped).
    pub async fn governed_call<F, Fut, T>(
        &self,
        provider: Provider,
        f: F,
    ) -> Result<T, BatchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, BatchError>>,
    {
        if !self.breaker_allows(provider).await {
            return Err(BatchError::ProviderUnavailable(provider.as_str().to_string()));
        }
        if !self.try_acquire(provider).await {
            warn!(provider = provider.as_str(), "rate limiter exhausted — dropping call");
            return Err(BatchError::ProviderTransient(format!(
                "{} rate limit exhausted",
                provider.as_str()
            )));
        }

        match f().await {
            Ok(value) => {
                self.record_success(provider).await;
                Ok(value)
            }
            Err(e) => {
                if e.counts_as_failed() {
                    self.record_failure(provider).await;
                }
                Err(e)
            }
        }
    }
}

pub type SharedRateGovernor = Arc<RateGovernor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn governed_call_drops_when_bucket_empty() {
        let gov = RateGovernor::new(0.0, 0.0);
        let result: Result<(), BatchError> = gov
            .governed_call(Provider::Email, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(BatchError::ProviderTransient(_))));
    }

    #[tokio::test]
    async fn governed_call_succeeds_with_capacity() {
        let gov = RateGovernor::new(200.0, 100.0);
        let result = gov
            .governed_call(Provider::Email, || async { Ok::<_, BatchError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_before_bucket_check() {
        let gov = RateGovernor::new(200.0, 100.0);
        for _ in 0..20 {
            gov.record_failure(Provider::Stripe).await;
        }
        assert_eq!(gov.circuit_state(Provider::Stripe).await, CircuitState::Open);
        let result: Result<(), BatchError> = gov
            .governed_call(Provider::Stripe, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(BatchError::ProviderUnavailable(_))));
    }
}
