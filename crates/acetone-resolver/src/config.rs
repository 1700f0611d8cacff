//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Resolver tuning knobs, lifted out of the ambient AcetoneConfig."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use acetone_resilience::{CircuitPolicy, PipelineConfig, RetryPolicy};

/// The subset of [`acetone_common::config::AcetoneConfig`] the resolver
/// needs, decoupled so the crate doesn't depend on `acetone-common`'s
/// config module directly.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub partition_cache_ttl: Duration,
    pub disable_partition_cache: bool,
    pub retry_count: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub per_attempt_timeout: Duration,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_break_duration: Duration,
    pub circuit_breaker_sampling_duration: Duration,
}

impl ResolverConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            per_attempt_timeout: self.per_attempt_timeout,
            retry: RetryPolicy::new(
                self.retry_count as usize,
                self.initial_retry_delay,
                self.max_retry_delay,
            ),
            circuit: CircuitPolicy {
                failure_threshold: self.circuit_breaker_failure_threshold,
                sampling_window: self.circuit_breaker_sampling_duration,
                break_duration: self.circuit_breaker_break_duration,
            },
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            partition_cache_ttl: Duration::from_secs(30),
            disable_partition_cache: false,
            retry_count: 10,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(2000),
            per_attempt_timeout: Duration::from_millis(5000),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_break_duration: Duration::from_millis(30_000),
            circuit_breaker_sampling_duration: Duration::from_millis(60_000),
        }
    }
}
