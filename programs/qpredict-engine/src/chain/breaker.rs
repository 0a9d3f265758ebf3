use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker around the chain RPC client (spec.md §4.6). Five
/// consecutive failures trip it open; it self-heals to half-open after
/// 30 seconds once observed, and a single half-open success closes it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_params(5, Duration::from_secs(30))
    }

    pub fn with_params(failure_threshold: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Observes the OPEN -> HALF_OPEN transition inline if the reset
    /// timeout has elapsed, then reports whether a call should be let
    /// through.
    pub fn is_healthy(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
        inner.state != BreakerState::Open
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    /// Returns `true` if this failure just tripped the breaker open (so
    /// the caller can emit the "breaker opened" alert exactly once).
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                true
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            BreakerState::Open => false,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::with_params(5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert!(breaker.is_healthy());
        }
        breaker.record_failure();
        assert!(!breaker.is_healthy());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_success_closes_and_resets_counter() {
        let breaker = CircuitBreaker::with_params(2, Duration::from_millis(10));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.is_healthy());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::with_params(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.is_healthy());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
