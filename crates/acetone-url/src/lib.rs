//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "URL identifier extraction, endpoint parsing, and address normalization."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Extracts an application identifier from an inbound request URL, pulls a
//! routable endpoint address out of a registry's partition payload, and
//! normalizes both against the handful of non-routable forms a cluster is
//! known to emit.

pub mod endpoint;
pub mod identifier;
pub mod normalize;
pub mod parser;

pub use endpoint::extract_endpoint;
pub use identifier::normalize_identifier;
pub use normalize::{normalize_address, sanitize_malformed};
pub use parser::{extract_identifier, ExtractionMode};
