//! Per-endpoint circuit breaker.
//!
//! Keeps a persistently failing plugin from eating a full retry cycle on
//! every single write. Three states:
//!
//! - **Closed**: deliveries pass through
//! - **Open**: deliveries are skipped until the reset timeout elapses
//! - **HalfOpen**: one probe delivery is allowed; success closes the circuit,
//!   failure reopens it

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long to stay open before allowing a probe.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        CircuitBreaker::new(BreakerConfig::default())
    }

    /// Whether a request may proceed. An open circuit whose reset timeout has
    /// elapsed moves to half-open and lets this request through as the probe.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_enough = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed_enough {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn report_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn report_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.failures = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(40),
        })
    }

    #[test]
    fn starts_closed_and_allows_requests() {
        let breaker = CircuitBreaker::with_defaults();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = fast_breaker(3);
        breaker.report_failure();
        breaker.report_failure();
        assert!(breaker.allow_request());
        breaker.report_failure();
        assert_eq!(breaker.current_state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let breaker = fast_breaker(3);
        breaker.report_failure();
        breaker.report_failure();
        breaker.report_success();
        breaker.report_failure();
        breaker.report_failure();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn probes_after_reset_timeout_and_closes_on_success() {
        let breaker = fast_breaker(1);
        breaker.report_failure();
        assert!(!breaker.allow_request());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(breaker.allow_request());
        assert_eq!(breaker.current_state(), CircuitState::HalfOpen);

        breaker.report_success();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let breaker = fast_breaker(1);
        breaker.report_failure();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(breaker.allow_request());

        breaker.report_failure();
        assert_eq!(breaker.current_state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }
}
