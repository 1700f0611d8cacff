//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Circuit breaker state machine: closed, open, half-open."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Threshold, break duration, and sampling window for the breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitPolicy {
    pub failure_threshold: u32,
    pub sampling_window: Duration,
    pub break_duration: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            sampling_window: Duration::from_secs(60),
            break_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct Inner {
    state: CircuitState,
    /// Timestamps of failures within the current sampling window.
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
    /// Whether a half-open probe is currently outstanding; only one probe
    /// is allowed in flight at a time.
    probe_in_flight: bool,
}

/// Per-operation circuit breaker guarding a named downstream call.
pub struct CircuitBreaker {
    name: String,
    policy: CircuitPolicy,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: CircuitPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: Vec::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Called before every attempt. Returns `true` if the call may proceed;
    /// `false` means fail fast with `CircuitOpen` without touching the
    /// downstream call or the failure counter.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.policy.break_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(operation = %self.name, "circuit breaker half-open: admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(operation = %self.name, "circuit breaker closing after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(operation = %self.name, "probe failed; circuit breaker re-opening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.failures.clear();
            }
            CircuitState::Closed => {
                let now = Instant::now();
                let window = self.policy.sampling_window;
                inner.failures.retain(|at| now.duration_since(*at) <= window);
                inner.failures.push(now);
                if inner.failures.len() as u32 >= self.policy.failure_threshold {
                    warn!(operation = %self.name, "circuit breaker opening after threshold breaches");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.failures.clear();
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_breaches() {
        let breaker = CircuitBreaker::new(
            "resolve_partition",
            CircuitPolicy {
                failure_threshold: 3,
                sampling_window: Duration::from_secs(60),
                break_duration: Duration::from_millis(50),
            },
        );
        for _ in 0..3 {
            assert!(breaker.try_acquire());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn half_open_allows_single_probe_then_closes_on_success() {
        let breaker = CircuitBreaker::new(
            "resolve_partition",
            CircuitPolicy {
                failure_threshold: 1,
                sampling_window: Duration::from_secs(60),
                break_duration: Duration::from_millis(10),
            },
        );
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.try_acquire());
        assert!(!breaker.try_acquire(), "a second concurrent probe must be rejected");
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(
            "resolve_partition",
            CircuitPolicy {
                failure_threshold: 1,
                sampling_window: Duration::from_secs(60),
                break_duration: Duration::from_millis(10),
            },
        );
        breaker.try_acquire();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
