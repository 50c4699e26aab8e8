//! Sliding-window circuit breaker for external provider calls.
//!
//! Protects Stripe and the bulk email provider from cascading failures. When
//! the failure rate over the last `window_size` calls crosses
//! `failure_rate_threshold`, the circuit opens and calls fail fast with
//! [`BatchError::ProviderUnavailable`] instead of blocking on a timeout.
//!
//! # State machine
//!
//! ```text
//! Closed ──(≥min_calls seen, failure rate ≥ threshold)──► Open
//!   ▲                                                        │
//!   └──(probe succeeds)──────────────────────────────── HalfOpen ◄─(timeout elapsed)──┘
//! ```
//!
//! - **Closed**: all calls allowed; each outcome is pushed onto a sliding
//!   window of the last `window_size` calls.
//! - **Open**: all calls rejected immediately. After `timeout` elapses, the
//!   breaker transitions to `HalfOpen` to test recovery.
//! - **HalfOpen**: a single probe call is allowed through. Success closes the
//!   circuit (and clears the window); failure reopens it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, warn};

/// Observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of most-recent calls kept in the sliding window.
    ///
    /// Default: 100
    pub window_size: usize,
    /// Minimum calls observed before the failure rate is evaluated.
    ///
    /// Default: 10
    pub min_calls: usize,
    /// Failure rate (0.0–1.0) at or above which the circuit opens.
    ///
    /// Default: 0.5
    pub failure_rate_threshold: f64,
    /// How long the circuit stays Open before a HalfOpen probe is allowed.
    ///
    /// Default: 30 seconds
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_calls: 10,
            failure_rate_threshold: 0.5,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    // `true` = failure, `false` = success, oldest at the front.
    window: VecDeque<bool>,
    last_transition: Option<Instant>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            last_transition: None,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|f| **f).count();
        failures as f64 / self.window.len() as f64
    }
}

/// Thread-safe circuit breaker. Cheaply cloneable — all clones share state via `Arc`.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<RwLock<BreakerInner>>,
    config: Arc<CircuitBreakerConfig>,
    name: Arc<str>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BreakerInner::new())),
            config: Arc::new(config),
            name: Arc::from(name.into().as_str()),
        }
    }

    /// Returns `true` if a call should be attempted right now.
    pub async fn is_allowed(&self) -> bool {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open => {
                    let elapsed = inner
                        .last_transition
                        .map(|t| t.elapsed())
                        .unwrap_or(Duration::ZERO);
                    if elapsed < self.config.timeout {
                        return false;
                    }
                }
            }
        }

        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_transition
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.config.timeout {
                info!(breaker = %self.name, "circuit breaker -> half_open (probe)");
                inner.state = CircuitState::HalfOpen;
                inner.last_transition = Some(Instant::now());
                return true;
            }
            return false;
        }
        true
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "circuit breaker -> closed (probe succeeded)");
                inner.state = CircuitState::Closed;
                inner.window.clear();
                inner.last_transition = None;
            }
            CircuitState::Closed => {
                push_outcome(&mut inner.window, self.config.window_size, false);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "circuit breaker -> open (probe failed)");
                inner.state = CircuitState::Open;
                inner.last_transition = Some(Instant::now());
            }
            CircuitState::Closed => {
                push_outcome(&mut inner.window, self.config.window_size, true);
                if inner.window.len() >= self.config.min_calls
                    && inner.failure_rate() >= self.config.failure_rate_threshold
                {
                    warn!(
                        breaker = %self.name,
                        failure_rate = inner.failure_rate(),
                        calls = inner.window.len(),
                        "circuit breaker -> open (failure rate threshold reached)"
                    );
                    inner.state = CircuitState::Open;
                    inner.last_transition = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Force the circuit closed (e.g. after an operator confirms recovery).
    pub async fn force_close(&self) {
        let mut inner = self.inner.write().await;
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "circuit breaker force-closed");
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.last_transition = None;
        }
    }
}

fn push_outcome(window: &mut VecDeque<bool>, max_len: usize, failure: bool) {
    window.push_back(failure);
    while window.len() > max_len {
        window.pop_front();
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 10,
            min_calls: 4,
            failure_rate_threshold: 0.5,
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreaker::new("test", fast_config());
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.is_allowed().await);
    }

    #[tokio::test]
    async fn stays_closed_below_min_calls() {
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_once_failure_rate_crosses_threshold() {
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_success().await;
        cb.record_success().await;
        cb.record_failure().await;
        cb.record_failure().await;
        // 4 calls, 50% failure -> threshold reached.
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.is_allowed().await);
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure().await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cb.is_allowed().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_circuit() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure().await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cb.is_allowed().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn force_close_resets_window() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure().await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        cb.force_close().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.is_allowed().await);
    }
}
