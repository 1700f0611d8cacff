//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Identifier normalization shared by application and service name comparisons."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

/// Normalize an application or type identifier for comparison: trim
/// whitespace, strip a `fabric:/` or `fabric:` prefix, trim leading and
/// trailing slashes, lowercase, and fold `_` to `-`.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("fabric:/")
        .or_else(|| trimmed.strip_prefix("fabric:"))
        .unwrap_or(trimmed);
    let without_slashes = without_prefix.trim_matches('/');
    without_slashes.to_lowercase().replace('_', "-")
}

/// Normalize a type identifier, additionally dropping a trailing `type`
/// suffix (case-insensitive) once the base identifier rules are applied.
pub fn normalize_type_identifier(raw: &str) -> String {
    let base = normalize_identifier(raw);
    base.strip_suffix("type").map(str::to_owned).unwrap_or(base)
}
