// Three-state circuit breaker. State transitions happen via compare-and-swap
// on an atomic word; the transition timestamp sits behind a short read/write
// lock and is only consulted when deciding whether an open circuit may probe.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;

const STATE_CLOSED: u8 = 0;
const STATE_HALF_OPEN: u8 = 1;
const STATE_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_HALF_OPEN => Self::HalfOpen,
            STATE_OPEN => Self::Open,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub reset_timeout: Duration,
    pub half_open_max_calls: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 5,
        }
    }
}

pub struct CircuitBreaker {
    state: AtomicU8,
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    half_open_calls: AtomicU64,
    last_state_change: RwLock<Instant>,
}

#[derive(Debug, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: &'static str,
    pub failure_count: u64,
    pub failure_threshold: u64,
    pub half_open_calls: u64,
    pub half_open_max_calls: u64,
    pub reset_timeout_ms: u64,
    pub time_in_state_ms: u64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            config,
            failure_count: AtomicU64::new(0),
            half_open_calls: AtomicU64::new(0),
            last_state_change: RwLock::new(Instant::now()),
        }
    }

    /// Admission predicate. An open circuit promotes itself to half-open once
    /// the reset timeout has elapsed; a half-open circuit admits a bounded
    /// number of probe calls.
    pub fn allow(&self) -> bool {
        loop {
            match CircuitState::from_raw(self.state.load(Ordering::Acquire)) {
                CircuitState::Closed => return true,
                CircuitState::Open => {
                    let elapsed = self
                        .last_state_change
                        .read()
                        .expect("lock poisoned")
                        .elapsed();

                    if elapsed < self.config.reset_timeout {
                        return false;
                    }

                    if self
                        .state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.stamp_transition();
                        self.half_open_calls.store(0, Ordering::Release);
                    }
                    // Re-evaluate under the new state.
                }
                CircuitState::HalfOpen => {
                    let calls = self.half_open_calls.fetch_add(1, Ordering::AcqRel) + 1;
                    return calls <= self.config.half_open_max_calls;
                }
            }
        }
    }

    pub fn success(&self) {
        match CircuitState::from_raw(self.state.load(Ordering::Acquire)) {
            CircuitState::HalfOpen => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.stamp_transition();
                    self.failure_count.store(0, Ordering::Release);
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    pub fn failure(&self) {
        match CircuitState::from_raw(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.stamp_transition();
                }
            }
            CircuitState::HalfOpen => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.stamp_transition();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Administrative override back to closed, zeroing all counters.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.half_open_calls.store(0, Ordering::Release);
        self.stamp_transition();
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let time_in_state = self
            .last_state_change
            .read()
            .expect("lock poisoned")
            .elapsed();

        CircuitBreakerMetrics {
            state: self.state().as_str(),
            failure_count: self.failure_count.load(Ordering::Acquire),
            failure_threshold: self.config.failure_threshold,
            half_open_calls: self.half_open_calls.load(Ordering::Acquire),
            half_open_max_calls: self.config.half_open_max_calls,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            time_in_state_ms: time_in_state.as_millis() as u64,
        }
    }

    fn stamp_transition(&self) {
        *self.last_state_change.write().expect("lock poisoned") = Instant::now();
    }
}

#[cfg(test)]
mod circuit_breaker_tests {
    use super::*;

    fn breaker(threshold: u64, reset_timeout: Duration, half_open_max: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout,
            half_open_max_calls: half_open_max,
        })
    }

    #[test]
    fn it_should_open_after_the_failure_threshold() {
        let breaker = breaker(3, Duration::from_secs(30), 2);

        breaker.failure();
        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());

        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_in_closed_state_zeroes_the_failure_count() {
        let breaker = breaker(3, Duration::from_secs(30), 2);

        breaker.failure();
        breaker.failure();
        breaker.success();
        breaker.failure();
        breaker.failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn it_should_probe_half_open_after_the_reset_timeout() {
        let breaker = breaker(1, Duration::from_millis(20), 2);

        breaker.failure();
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(40));

        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow());
        assert!(!breaker.allow(), "half-open probes are capped");
    }

    #[test]
    fn a_successful_probe_closes_the_circuit() {
        let breaker = breaker(1, Duration::from_millis(10), 5);

        breaker.failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow());

        breaker.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        for _ in 0..50 {
            assert!(breaker.allow());
        }
    }

    #[test]
    fn a_failed_probe_reopens_the_circuit() {
        let breaker = breaker(1, Duration::from_millis(10), 5);

        breaker.failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow());

        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn reset_forces_the_circuit_closed() {
        let breaker = breaker(1, Duration::from_secs(30), 1);

        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
        assert_eq!(breaker.metrics().failure_count, 0);
    }
}
