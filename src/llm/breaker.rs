//! Circuit breaker for the outbound model endpoint.
//!
//! Tracks consecutive failures and short-circuits calls once the endpoint
//! looks unhealthy. After a recovery period a single probe call is allowed
//! through; its outcome decides whether the circuit closes again.
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  recovery   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure             │
//!     └─────────────────────────┴──────────────────────┘
//! ```

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Endpoint healthy, calls pass through.
    Closed,
    /// Too many consecutive failures, calls are rejected until recovery.
    Open,
    /// Recovery elapsed, one probe call is allowed.
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping to Open.
    pub failure_threshold: u32,
    /// Seconds to wait in Open before allowing a probe.
    pub recovery_secs: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call should be attempted now. An Open circuit whose
    /// recovery period has elapsed transitions to HalfOpen and admits one
    /// probe.
    pub fn should_attempt(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = self
                    .last_failure_at
                    .map_or(true, |t| t.elapsed().as_secs() >= self.config.recovery_secs);
                if recovered {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("Model circuit closed after successful call");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Instant::now());

        if self.consecutive_failures >= self.config.failure_threshold {
            if self.state != CircuitState::Open {
                tracing::warn!(
                    failures = self.consecutive_failures,
                    recovery_secs = self.config.recovery_secs,
                    "Model circuit opened"
                );
            }
            self.state = CircuitState::Open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_secs,
        })
    }

    #[test]
    fn stays_closed_below_threshold() {
        let mut breaker = make_breaker(5, 60);
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.should_attempt());
    }

    #[test]
    fn trips_open_at_threshold() {
        let mut breaker = make_breaker(5, 600);
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.should_attempt());
    }

    #[test]
    fn open_transitions_to_half_open_after_recovery() {
        let mut breaker = make_breaker(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Zero recovery: the next attempt check admits a probe.
        assert!(breaker.should_attempt());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes() {
        let mut breaker = make_breaker(1, 0);
        breaker.record_failure();
        let _ = breaker.should_attempt();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_retrips() {
        let mut breaker = make_breaker(1, 0);
        breaker.record_failure();
        let _ = breaker.should_attempt();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut breaker = make_breaker(5, 60);
        for _ in 0..10 {
            breaker.record_failure();
            breaker.record_success();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
