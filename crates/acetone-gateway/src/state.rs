//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared gateway state: resolver handle, forwarder, and admission control."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use acetone_common::config::IdentifierLocation;
use acetone_resolver::Resolver;
use acetone_url::ExtractionMode;
use tokio::sync::Semaphore;

use crate::forwarder::Forwarder;

pub(crate) fn extraction_mode(location: IdentifierLocation) -> ExtractionMode {
    match location {
        IdentifierLocation::Subdomain => ExtractionMode::Subdomain,
        IdentifierLocation::SubdomainPreHyphens => ExtractionMode::SubdomainPreHyphens,
        IdentifierLocation::SubdomainPostHyphens => ExtractionMode::SubdomainPostHyphens,
        IdentifierLocation::FirstPathSegment => ExtractionMode::FirstPathSegment,
    }
}

/// Tuning the routing middleware needs, lifted out of the ambient
/// `AcetoneConfig` the way [`acetone_resolver::ResolverConfig`] is.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub identifier_location: IdentifierLocation,
    pub sensitive_headers: Vec<String>,
    pub max_concurrent_requests: u32,
    pub acetone_version: String,
}

/// Tracks whether the registry port was reachable on the last probe, for
/// `/health/ready`. Updated opportunistically by every resolution; a
/// dedicated probe additionally drives it when the server has been idle.
#[derive(Debug, Default)]
pub struct ReadinessProbe {
    ready: AtomicBool,
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn mark_unready(&self) {
        self.ready.store(false, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Shared state handed to every routing middleware invocation.
pub struct GatewayState {
    pub resolver: Arc<Resolver>,
    pub forwarder: Arc<dyn Forwarder>,
    pub admission: Arc<Semaphore>,
    pub readiness: Arc<ReadinessProbe>,
    pub identifier_location: IdentifierLocation,
    pub sensitive_headers: Vec<String>,
    pub acetone_version: String,
}

impl GatewayState {
    pub fn new(
        resolver: Arc<Resolver>,
        forwarder: Arc<dyn Forwarder>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            resolver,
            forwarder,
            admission: Arc::new(Semaphore::new(config.max_concurrent_requests as usize)),
            readiness: Arc::new(ReadinessProbe::new()),
            identifier_location: config.identifier_location,
            sensitive_headers: config
                .sensitive_headers
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
            acetone_version: config.acetone_version.clone(),
        }
    }
}
