//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Cross-module integration test for the timeout/retry/breaker pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acetone_common::ProxyError;
use acetone_metrics::{new_registry, Telemetry};
use acetone_resilience::{CircuitPolicy, PipelineConfig, ResiliencePipeline, RetryPolicy};

#[tokio::test]
async fn pipeline_retries_then_opens_breaker_and_records_metrics() {
    let registry = new_registry();
    let telemetry = Telemetry::new(registry.clone()).unwrap();
    let pipeline = ResiliencePipeline::new(PipelineConfig {
        per_attempt_timeout: Duration::from_millis(200),
        retry: RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(2)),
        circuit: CircuitPolicy {
            failure_threshold: 2,
            sampling_window: Duration::from_secs(60),
            break_duration: Duration::from_millis(10),
        },
    })
    .with_telemetry(telemetry);

    // First call: one retry then success.
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    let result = pipeline
        .call("resolve_partition", move || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ProxyError::TransientFault("flaky".into()))
                } else {
                    Ok::<_, ProxyError>(42)
                }
            }
        })
        .await;
    assert_eq!(result.unwrap(), 42);

    // Two consecutive fully-exhausted failures (one attempt plus one retry
    // each) trip the two-failure threshold and open the breaker.
    for _ in 0..2 {
        let outcome = pipeline
            .call("resolve_partition", || async {
                Err::<i32, _>(ProxyError::TransientFault("down".into()))
            })
            .await;
        assert!(outcome.is_err());
    }

    let calls_before = Arc::new(AtomicUsize::new(0));
    let calls_before_clone = calls_before.clone();
    let fast_fail = pipeline
        .call("resolve_partition", move || {
            let calls_before = calls_before_clone.clone();
            async move {
                calls_before.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProxyError>(0)
            }
        })
        .await;
    assert!(matches!(fast_fail, Err(ProxyError::CircuitOpen(_))));
    assert_eq!(calls_before.load(Ordering::SeqCst), 0, "breaker must short-circuit before invoking the call");

    let families = registry.gather();
    let metric_names: Vec<_> = families.iter().map(|fam| fam.get_name().to_string()).collect();
    assert!(metric_names.contains(&"registry_calls_total".to_string()));
    assert!(metric_names.contains(&"retry_attempts_total".to_string()));
    assert!(metric_names.contains(&"circuit_state".to_string()));

    // The gauge must actually reflect the open state the breaker is in,
    // not merely be registered: find the "open" label and confirm it reads
    // 1 while every other label reads 0.
    let circuit_state_family = families
        .iter()
        .find(|fam| fam.get_name() == "circuit_state")
        .expect("circuit_state family is registered");
    for metric in circuit_state_family.get_metric() {
        let state_label = metric
            .get_label()
            .iter()
            .find(|label| label.get_name() == "state")
            .expect("circuit_state gauge carries a state label")
            .get_value();
        let expected = if state_label == "open" { 1.0 } else { 0.0 };
        assert_eq!(
            metric.get_gauge().get_value(),
            expected,
            "state label {state_label} has unexpected gauge value"
        );
    }
}
