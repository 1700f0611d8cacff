//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-attempt timeout, retry, and circuit breaker composed around a registry call."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use acetone_common::ProxyError;
use acetone_metrics::Telemetry;
use parking_lot::Mutex;
use tracing::warn;

use crate::circuit::{CircuitBreaker, CircuitPolicy};
use crate::retry::{new_rng, RetryPolicy};

/// Configuration for the whole pipeline: per-attempt timeout plus the retry
/// and circuit breaker policies.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub per_attempt_timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit: CircuitPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            circuit: CircuitPolicy::default(),
        }
    }
}

/// Wraps every registry call in a per-attempt timeout, exponential-backoff
/// retry, and a circuit breaker keyed by operation name. One instance is
/// shared across a resolver and owns one breaker per operation it has seen.
pub struct ResiliencePipeline {
    config: PipelineConfig,
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
    telemetry: Option<Telemetry>,
}

impl ResiliencePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn breaker_for(&self, operation: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(operation.to_owned())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(operation, self.config.circuit)))
            .clone()
    }

    /// Run `call` under the full pipeline. `call` is invoked once per
    /// attempt and must be cheap to construct (typically a closure
    /// capturing a cloned `Arc<dyn RegistryPort>`).
    pub async fn call<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T, ProxyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        let breaker = self.breaker_for(operation);
        let mut rng = new_rng();
        let attempts = self.config.retry.count + 1;

        for attempt in 1..=attempts {
            let acquired = breaker.try_acquire();
            self.record_circuit_state(&breaker);
            if !acquired {
                return Err(ProxyError::CircuitOpen(operation.to_owned()));
            }

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.config.per_attempt_timeout, call()).await;
            let elapsed = started.elapsed();
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_registry_call(operation, elapsed);
            }

            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(ProxyError::Timeout(self.config.per_attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    breaker.record_success();
                    self.record_circuit_state(&breaker);
                    return Ok(value);
                }
                Err(ProxyError::Canceled) => {
                    return Err(ProxyError::Canceled);
                }
                Err(err) if err.is_retryable() => {
                    breaker.record_failure();
                    self.record_circuit_state(&breaker);
                    if attempt == attempts {
                        return Err(err);
                    }
                    let delay = self.config.retry.delay_for(attempt, &mut rng);
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record_retry();
                    }
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying registry call",
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    breaker.record_failure();
                    self.record_circuit_state(&breaker);
                    return Err(err);
                }
            }
        }

        unreachable!("loop always returns on the final attempt")
    }

    pub fn circuit_state(&self, operation: &str) -> crate::circuit::CircuitState {
        self.breaker_for(operation).state()
    }

    fn record_circuit_state(&self, breaker: &CircuitBreaker) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.set_circuit_state(breaker.state().as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let pipeline = ResiliencePipeline::new(PipelineConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            ..PipelineConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = pipeline
            .call("resolve_partition", move || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ProxyError::TransientFault("boom".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_fault_is_not_retried() {
        let pipeline = ResiliencePipeline::new(PipelineConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result: Result<(), ProxyError> = pipeline
            .call("list_applications", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyError::PermanentFault("nope".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_calling() {
        let pipeline = ResiliencePipeline::new(PipelineConfig {
            retry: RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1)),
            circuit: CircuitPolicy {
                failure_threshold: 1,
                sampling_window: Duration::from_secs(60),
                break_duration: Duration::from_secs(60),
            },
            ..PipelineConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _: Result<(), ProxyError> = pipeline
            .call("resolve_partition", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyError::TransientFault("boom".into()))
                }
            })
            .await;
        assert_eq!(pipeline.circuit_state("resolve_partition"), crate::circuit::CircuitState::Open);

        let calls_clone = calls.clone();
        let result: Result<(), ProxyError> = pipeline
            .call("resolve_partition", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result, Err(ProxyError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call must fail fast without invoking the closure");
    }
}
