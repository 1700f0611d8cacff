//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the acetone proxy runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the acetone proxy workspace.
//! This crate exposes configuration loading, the shared error taxonomy,
//! structured logging setup, and version metadata utilities consumed
//! across the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod version;

pub use config::{
    AcetoneConfig, CredentialsMode, IdentifierLocation, LoadedConfig, LoggingConfig,
    MetricsConfig, SensitiveHeadersConfig,
};
pub use error::ProxyError;
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
