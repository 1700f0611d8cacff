//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Build and version metadata for the proxy binary."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::Serialize;

/// Version metadata baked in at compile time via `vergen`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_sha: String,
    pub build_timestamp: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            git_sha: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown").to_owned(),
            build_timestamp: option_env!("VERGEN_BUILD_TIMESTAMP")
                .unwrap_or("unknown")
                .to_owned(),
        }
    }

    /// Render a short string suitable for CLI banners and the `X-Acetone-Version` header.
    pub fn header_value(&self) -> String {
        format!("{}+{}", self.version, short_sha(&self.git_sha))
    }

    pub fn cli_string(&self) -> String {
        format!(
            "acetone {} ({}, built {})",
            self.version, self.git_sha, self.build_timestamp
        )
    }
}

fn short_sha(sha: &str) -> &str {
    if sha.len() > 8 {
        &sha[..8]
    } else {
        sha
    }
}
