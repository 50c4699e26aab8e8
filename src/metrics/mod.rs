//! Process-wide counters backing the trigger API's health/metrics surface.
//! Atomics rather than a full metrics crate — the trigger API's
//! observability surface is a handful of counters, not a Prometheus exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::governor::{CircuitState, Provider, RateGovernor};

#[derive(Default)]
pub struct Metrics {
    jobs_run: AtomicU64,
    jobs_failed: AtomicU64,
    stripe_calls: AtomicU64,
    email_sends: AtomicU64,
}

impl Metrics {
    pub fn record_job_completed(&self, failed: bool) {
        self.jobs_run.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stripe_call(&self) {
        self.stripe_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_email_send(&self) {
        self.email_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self, governor: &RateGovernor) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_run: self.jobs_run.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            stripe_calls: self.stripe_calls.load(Ordering::Relaxed),
            email_sends: self.email_sends.load(Ordering::Relaxed),
            stripe_circuit_state: governor.circuit_state(Provider::Stripe).await,
            email_circuit_state: governor.circuit_state(Provider::Email).await,
        }
    }
}

pub struct MetricsSnapshot {
    pub jobs_run: u64,
    pub jobs_failed: u64,
    pub stripe_calls: u64,
    pub email_sends: u64,
    pub stripe_circuit_state: CircuitState,
    pub email_circuit_state: CircuitState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_recorded_counts() {
        let metrics = Metrics::default();
        metrics.record_job_completed(false);
        metrics.record_job_completed(true);
        metrics.record_stripe_call();
        metrics.record_email_send();

        let governor = RateGovernor::new(200.0, 10.0);
        let snapshot = metrics.snapshot(&governor).await;
        assert_eq!(snapshot.jobs_run, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.stripe_calls, 1);
        assert_eq!(snapshot.email_sends, 1);
    }
}
