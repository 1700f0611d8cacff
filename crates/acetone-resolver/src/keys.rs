//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Cache key composition for the application/service resolution families."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use acetone_url::normalize_identifier;

/// General resolution targets a stateless API/service; function resolution
/// targets a stateless function service. They use disjoint cache-key
/// families so a single identifier can carry both concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFamily {
    General,
    Function,
}

impl ResolutionFamily {
    fn suffix(&self) -> &'static str {
        match self {
            ResolutionFamily::General => "",
            ResolutionFamily::Function => "-FKT",
        }
    }
}

/// Compose the Tier 1 Application cache key: upper-cased identifier, a
/// version marker (the supplied version, or `-no-service-version`), and the
/// family suffix.
pub fn application_key(identifier: &str, version: Option<&str>, family: ResolutionFamily) -> String {
    let normalized = normalize_identifier(identifier).to_uppercase();
    let version_marker = version
        .map(|v| format!("${}", v.to_uppercase()))
        .unwrap_or_else(|| "-no-service-version".to_uppercase());
    format!("{}{}{}", normalized, version_marker, family.suffix())
}

/// Compose the Tier 2 Service cache key from the application's absolute
/// name, with the family suffix distinguishing the function lookup.
pub fn service_key(application_name: &str, family: ResolutionFamily) -> String {
    format!("{}{}", application_name, family.suffix())
}

/// Compose the Tier 3 Partition cache key from the service's absolute name.
pub fn partition_key(service_name: &str) -> String {
    service_name.to_owned()
}
