//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Application identifier extraction from inbound request URLs."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Where in the request URL the application identifier lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionMode {
    Subdomain,
    SubdomainPreHyphens,
    SubdomainPostHyphens,
    FirstPathSegment,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("could not parse '{0}' as a URL")]
    InvalidUrl(String),
    #[error("no identifier segment present in '{0}'")]
    EmptySegment(String),
}

static PR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)-(\d+)$").unwrap());

/// Extract an application identifier from `raw_url` under the given mode,
/// applying the pull-request rewrite where it is defined to apply.
pub fn extract_identifier(raw_url: &str, mode: ExtractionMode) -> Result<String, ParseError> {
    let segment = raw_segment(raw_url, mode)?;
    if segment.is_empty() {
        return Err(ParseError::EmptySegment(raw_url.to_owned()));
    }

    let transform_applies = matches!(
        mode,
        ExtractionMode::Subdomain | ExtractionMode::FirstPathSegment
    );

    if transform_applies {
        if let Some(captures) = PR_PATTERN.captures(&segment) {
            let name = &captures[1];
            let digits = &captures[2];
            return Ok(format!("{}-PR{}", capitalize(name), digits));
        }
    }

    Ok(segment)
}

fn raw_segment(raw_url: &str, mode: ExtractionMode) -> Result<String, ParseError> {
    let with_scheme = if raw_url.contains("://") {
        raw_url.to_owned()
    } else {
        format!("https://{}", raw_url)
    };

    let url = Url::parse(&with_scheme).map_err(|_| ParseError::InvalidUrl(raw_url.to_owned()))?;

    match mode {
        ExtractionMode::Subdomain => {
            let host = url.host_str().ok_or_else(|| ParseError::InvalidUrl(raw_url.to_owned()))?;
            Ok(host.split('.').next().unwrap_or_default().to_owned())
        }
        ExtractionMode::SubdomainPreHyphens => {
            let host = url.host_str().ok_or_else(|| ParseError::InvalidUrl(raw_url.to_owned()))?;
            let first_dot_segment = host.split('.').next().unwrap_or_default();
            Ok(first_dot_segment.split('-').next().unwrap_or_default().to_owned())
        }
        ExtractionMode::SubdomainPostHyphens => {
            let host = url.host_str().ok_or_else(|| ParseError::InvalidUrl(raw_url.to_owned()))?;
            let first_dot_segment = host.split('.').next().unwrap_or_default();
            Ok(first_dot_segment
                .split('-')
                .last()
                .unwrap_or_default()
                .to_owned())
        }
        ExtractionMode::FirstPathSegment => {
            let mut segments = url
                .path_segments()
                .map(|s| s.collect::<Vec<_>>())
                .unwrap_or_default();
            segments.retain(|s| !s.is_empty());
            Ok(segments.first().copied().unwrap_or_default().to_owned())
        }
    }
}

fn capitalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
