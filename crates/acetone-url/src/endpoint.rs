//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Extraction of routable endpoint URLs from registry partition payloads."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use acetone_common::ProxyError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ENDPOINT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?P<scheme>https?|tcp)://(?P<host>\[[0-9a-fA-F:]+\]|[a-zA-Z0-9.\-]+)(?::(?P<port>\d+))?",
    )
    .unwrap()
});

/// Extract the first routable endpoint from a partition's raw endpoint
/// address string, which may be a bare URL, a JSON envelope of the form
/// `{"Endpoints":{"name":"url"}}`, or an escaped (`\/`) variant of either.
pub fn extract_endpoint(raw: &str) -> Result<String, ProxyError> {
    let unescaped = raw.replace("\\/", "/");
    let candidate = if unescaped.trim_start().starts_with('{') {
        first_envelope_url(&unescaped).unwrap_or(unescaped)
    } else {
        unescaped
    };

    let captures = ENDPOINT_PATTERN
        .captures(&candidate)
        .ok_or_else(|| ProxyError::MalformedEndpoint(raw.to_owned()))?;

    let scheme = captures.name("scheme").unwrap().as_str().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ProxyError::MalformedEndpoint(raw.to_owned()));
    }
    let host = captures.name("host").unwrap().as_str();
    let port = captures.name("port").map(|m| m.as_str());

    let mut url = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        url.push(':');
        url.push_str(port);
    }
    Ok(url)
}

fn first_envelope_url(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let endpoints = value.get("Endpoints")?.as_object()?;
    if let Some(default_entry) = endpoints.get("") {
        if let Some(s) = default_entry.as_str() {
            return Some(s.to_owned());
        }
    }
    endpoints.values().find_map(|v| v.as_str().map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_url() {
        let endpoint = extract_endpoint("http://10.0.0.5:8080/").unwrap();
        assert_eq!(endpoint, "http://10.0.0.5:8080");
    }

    #[test]
    fn extracts_from_json_envelope() {
        let endpoint = extract_endpoint(r#"{"Endpoints":{"":"http://10.0.0.5:8080/"}}"#).unwrap();
        assert_eq!(endpoint, "http://10.0.0.5:8080");
    }

    #[test]
    fn unescapes_forward_slashes() {
        let endpoint =
            extract_endpoint(r#"{"Endpoints":{"":"https:\/\/host:9443\/"}}"#).unwrap();
        assert_eq!(endpoint, "https://host:9443");
    }

    #[test]
    fn accepts_bracketed_ipv6() {
        let endpoint = extract_endpoint("http://[::1]:8080/").unwrap();
        assert_eq!(endpoint, "http://[::1]:8080");
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = extract_endpoint("tcp://10.0.0.5:8080/").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedEndpoint(_)));
    }

    #[test]
    fn rejects_unparseable_payload() {
        let err = extract_endpoint("not-a-url-at-all").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedEndpoint(_)));
    }
}
