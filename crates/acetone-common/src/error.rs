//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared error taxonomy for resolution and registry failures."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

/// Error taxonomy shared by the registry port, resilience pipeline, resolver,
/// and routing middleware. Every variant maps to exactly one HTTP status at
/// the middleware boundary.
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    #[error("application not found for identifier '{0}'")]
    ApplicationNotFound(String),

    #[error("service not found under application '{0}'")]
    ServiceNotFound(String),

    #[error("ambiguous service selection under application '{0}': {1} candidates")]
    AmbiguousService(String, usize),

    #[error("malformed endpoint: {0}")]
    MalformedEndpoint(String),

    #[error("transient registry fault: {0}")]
    TransientFault(String),

    #[error("registry call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("circuit breaker open for operation '{0}'")]
    CircuitOpen(String),

    #[error("permanent registry fault: {0}")]
    PermanentFault(String),

    #[error("operation canceled")]
    Canceled,
}

impl ProxyError {
    /// Whether the resilience pipeline should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::TransientFault(_) | ProxyError::Timeout(_))
    }

    /// Short machine-readable label, used as a metric/log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::ApplicationNotFound(_) => "application_not_found",
            ProxyError::ServiceNotFound(_) => "service_not_found",
            ProxyError::AmbiguousService(_, _) => "ambiguous_service",
            ProxyError::MalformedEndpoint(_) => "malformed_endpoint",
            ProxyError::TransientFault(_) => "transient_fault",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::CircuitOpen(_) => "circuit_open",
            ProxyError::PermanentFault(_) => "permanent_fault",
            ProxyError::Canceled => "canceled",
        }
    }
}
