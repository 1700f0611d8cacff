//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Address normalization for non-routable or malformed endpoint hosts."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static TRAILING_PORT_IPV6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*:\d+):[0-9a-fA-F:]+$").unwrap());
static EXTRA_AUTHORITY_COLONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://[^:/]+:\d+):.+$").unwrap());

/// Rewrite a validated endpoint URL so it never points at a non-routable
/// or self-referential host: `0.0.0.0` becomes `127.0.0.1`, `[::]` becomes
/// `[::1]`, and a host matching the current machine's hostname becomes
/// `localhost`.
pub fn normalize_address(endpoint: &str) -> String {
    let rewritten = match endpoint {
        _ if endpoint.contains("0.0.0.0") => endpoint.replace("0.0.0.0", "127.0.0.1"),
        _ if endpoint.contains("[::]") => endpoint.replace("[::]", "[::1]"),
        _ => endpoint.to_owned(),
    };

    match Url::parse(&rewritten) {
        Ok(url) => {
            if let Some(host) = url.host_str() {
                if own_hostname_matches(host) {
                    return rewritten.replacen(host, "localhost", 1);
                }
            }
            rewritten
        }
        Err(_) => rewritten,
    }
}

fn own_hostname_matches(host: &str) -> bool {
    match hostname::get() {
        Ok(name) => name
            .to_str()
            .map(|n| n.eq_ignore_ascii_case(host))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Best-effort repair of endpoint strings known to come back malformed
/// from certain registry configurations: a trailing IPv6 tail appended
/// after a port, or stray colons in the authority section. Returns the
/// input unchanged if no known pattern matches or the repair still fails
/// to parse.
pub fn sanitize_malformed(raw: &str) -> String {
    if let Some(captures) = TRAILING_PORT_IPV6.captures(raw) {
        let repaired = captures[1].to_owned();
        if Url::parse(&repaired).is_ok() {
            return repaired;
        }
    }
    if let Some(captures) = EXTRA_AUTHORITY_COLONS.captures(raw) {
        let repaired = captures[1].to_owned();
        if Url::parse(&repaired).is_ok() {
            return repaired;
        }
    }
    raw.to_owned()
}
