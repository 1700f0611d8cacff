//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-attempt timeout, exponential-backoff retry, and circuit breaker pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod circuit;
pub mod pipeline;
pub mod retry;

pub use circuit::{CircuitBreaker, CircuitPolicy, CircuitState};
pub use pipeline::{PipelineConfig, ResiliencePipeline};
pub use retry::RetryPolicy;
