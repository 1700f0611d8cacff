//! ---
//! ems_section: "04-caching-invalidation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Three-tier application/service/partition cache with single-flight guards."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

pub mod cache;
pub mod guard;
pub mod tier;

pub use cache::ResolutionCache;
pub use guard::SingleFlight;
pub use tier::{ApplicationCache, PartitionCache, ServiceCache};
