//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Application and service disambiguation heuristics (Resolver Steps A/B)."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use acetone_common::ProxyError;
use acetone_registry::{Application, ApplicationStatus, Service, ServiceKind};
use acetone_url::identifier::normalize_type_identifier;
use acetone_url::normalize_identifier;
use tracing::warn;

use crate::keys::ResolutionFamily;

/// Step A selection: filter by type name first, fall back to application
/// name, then narrow by version, readiness, and finally a deterministic
/// lexicographic tiebreak.
pub fn select_application(
    applications: &[Application],
    identifier: &str,
    version: Option<&str>,
) -> Result<Application, ProxyError> {
    let normalized_identifier = normalize_identifier(identifier);

    let mut by_type: Vec<&Application> = applications
        .iter()
        .filter(|app| normalize_type_identifier(&app.type_name) == normalized_identifier)
        .collect();

    let mut candidates: Vec<&Application> = if by_type.len() == 1 {
        return Ok(by_type.remove(0).clone());
    } else if by_type.len() > 1 {
        let by_name: Vec<&Application> = by_type
            .iter()
            .filter(|app| normalize_identifier(&app.name) == normalized_identifier)
            .copied()
            .collect();
        if by_name.len() == 1 {
            return Ok(by_name[0].clone());
        }
        by_type
    } else {
        applications
            .iter()
            .filter(|app| normalize_identifier(&app.name) == normalized_identifier)
            .collect()
    };

    if candidates.is_empty() {
        return Err(ProxyError::ApplicationNotFound(identifier.to_owned()));
    }

    if candidates.len() > 1 {
        if let Some(version) = version {
            let restricted: Vec<&Application> = candidates
                .iter()
                .filter(|app| app.type_version.eq_ignore_ascii_case(version))
                .copied()
                .collect();
            if !restricted.is_empty() {
                candidates = restricted;
            }
        }
    }

    if candidates.len() > 1 {
        let ready: Vec<&Application> = candidates
            .iter()
            .filter(|app| app.status == ApplicationStatus::Ready)
            .copied()
            .collect();
        if !ready.is_empty() {
            candidates = ready;
        }
    }

    if candidates.len() > 1 {
        candidates.sort_by_key(|app| normalize_identifier(&app.name));
        warn!(
            identifier,
            candidate_count = candidates.len(),
            "multiple applications remain after disambiguation; taking lexicographic first",
        );
    }

    Ok(candidates[0].clone())
}

/// Step B selection: exactly one stateless service whose type name matches
/// the family's substring heuristic.
pub fn select_service(services: &[Service], family: ResolutionFamily) -> Result<Service, ProxyError> {
    let matches: Vec<&Service> = services
        .iter()
        .filter(|service| service.kind == ServiceKind::Stateless)
        .filter(|service| {
            let upper = service.type_name.to_uppercase();
            match family {
                ResolutionFamily::General => upper.contains("API") || upper.contains("SERVICE"),
                ResolutionFamily::Function => upper.contains("FUNCTION"),
            }
        })
        .collect();

    match matches.len() {
        0 => Err(ProxyError::ServiceNotFound(
            services.first().map(|s| s.name.clone()).unwrap_or_default(),
        )),
        1 => Ok(matches[0].clone()),
        n => Err(ProxyError::AmbiguousService(
            matches[0].name.clone(),
            n,
        )),
    }
}
