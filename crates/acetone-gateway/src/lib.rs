//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Routing middleware, forwarder, and public HTTP surface."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Routes every inbound request through identifier extraction, resolution,
//! and a forwarder, under admission control. Also hosts the liveness and
//! readiness probes.

pub mod forwarder;
pub mod middleware;
pub mod server;
pub mod state;

pub use forwarder::{Forwarder, ReqwestForwarder};
pub use server::{spawn_gateway_server, GatewayServer};
pub use state::{GatewayConfig, GatewayState, ReadinessProbe};
