//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Configuration loading and validation for the proxy runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_identifier_location() -> IdentifierLocation {
    IdentifierLocation::Subdomain
}

fn default_credentials_mode() -> CredentialsMode {
    CredentialsMode::None
}

fn default_partition_cache_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_count() -> u32 {
    10
}

fn default_initial_retry_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_millis(2000)
}

fn default_per_attempt_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_break_duration() -> Duration {
    Duration::from_millis(30_000)
}

fn default_breaker_sampling_duration() -> Duration {
    Duration::from_millis(60_000)
}

fn default_max_concurrent_requests() -> u32 {
    100
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default listen address")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898".parse().expect("valid default metrics address")
}

fn default_sensitive_headers() -> Vec<String> {
    vec![
        "authorization".to_owned(),
        "cookie".to_owned(),
        "x-api-key".to_owned(),
    ]
}

/// Primary configuration object for the acetone proxy runtime.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcetoneConfig {
    #[serde(default)]
    pub cluster_endpoints: Vec<String>,
    #[serde(default = "default_identifier_location")]
    pub identifier_location: IdentifierLocation,
    #[serde(default = "default_credentials_mode")]
    pub credentials_mode: CredentialsMode,
    #[serde(default)]
    pub client_cert_thumbprint: Option<String>,
    #[serde(default)]
    pub server_cert_thumbprint: Option<String>,

    #[serde(default = "default_partition_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub partition_cache_ttl: Duration,
    #[serde(default)]
    pub disable_partition_cache: bool,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_initial_retry_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub initial_retry_delay: Duration,
    #[serde(default = "default_max_retry_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_retry_delay: Duration,
    #[serde(default = "default_per_attempt_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub per_attempt_timeout: Duration,

    #[serde(default = "default_breaker_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_break_duration")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub circuit_breaker_break_duration: Duration,
    #[serde(default = "default_breaker_sampling_duration")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub circuit_breaker_sampling_duration: Duration,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,

    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub sensitive_headers: SensitiveHeadersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AcetoneConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AcetoneConfig,
    pub source: PathBuf,
}

impl AcetoneConfig {
    pub const ENV_CONFIG_PATH: &'static str = "ACETONE_CONFIG";

    /// Load configuration from disk, respecting the `ACETONE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AcetoneConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_endpoints.is_empty() {
            return Err(anyhow!("configuration must declare at least one cluster endpoint"));
        }
        if self.retry_count == 0 || self.retry_count > 20 {
            return Err(anyhow!("retry_count must be between 1 and 20"));
        }
        if self.max_concurrent_requests == 0 || self.max_concurrent_requests > 1000 {
            return Err(anyhow!("max_concurrent_requests must be between 1 and 1000"));
        }
        let ttl_secs = self.partition_cache_ttl.as_secs();
        if ttl_secs == 0 || ttl_secs > 3600 {
            return Err(anyhow!("partition_cache_ttl must be between 1 and 3600 seconds"));
        }
        Ok(())
    }
}

impl Default for AcetoneConfig {
    fn default() -> Self {
        Self {
            cluster_endpoints: Vec::new(),
            identifier_location: default_identifier_location(),
            credentials_mode: default_credentials_mode(),
            client_cert_thumbprint: None,
            server_cert_thumbprint: None,
            partition_cache_ttl: default_partition_cache_ttl(),
            disable_partition_cache: false,
            retry_count: default_retry_count(),
            initial_retry_delay: default_initial_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            per_attempt_timeout: default_per_attempt_timeout(),
            circuit_breaker_failure_threshold: default_breaker_failure_threshold(),
            circuit_breaker_break_duration: default_breaker_break_duration(),
            circuit_breaker_sampling_duration: default_breaker_sampling_duration(),
            max_concurrent_requests: default_max_concurrent_requests(),
            listen: default_listen(),
            sensitive_headers: SensitiveHeadersConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl std::str::FromStr for AcetoneConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AcetoneConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where in the request URL the application identifier is extracted from.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum IdentifierLocation {
    Subdomain,
    SubdomainPreHyphens,
    SubdomainPostHyphens,
    FirstPathSegment,
}

impl std::str::FromStr for IdentifierLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subdomain" => Ok(IdentifierLocation::Subdomain),
            "subdomainprehyphens" => Ok(IdentifierLocation::SubdomainPreHyphens),
            "subdomainposthyphens" => Ok(IdentifierLocation::SubdomainPostHyphens),
            "firstpathsegment" => Ok(IdentifierLocation::FirstPathSegment),
            other => Err(format!("unknown identifier location: {}", other)),
        }
    }
}

/// Authentication mode used when talking to the cluster registry.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum CredentialsMode {
    #[default]
    None,
    CertificateByThumbprint,
    CertificateBySubject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitiveHeadersConfig {
    #[serde(default = "default_sensitive_headers")]
    pub names: Vec<String>,
}

impl Default for SensitiveHeadersConfig {
    fn default() -> Self {
        Self {
            names: default_sensitive_headers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            cluster_endpoints = ["https://cluster.local:19080"]
        "#;
        let config: AcetoneConfig = toml_str.parse().unwrap();
        assert_eq!(config.cluster_endpoints.len(), 1);
        assert_eq!(config.identifier_location, IdentifierLocation::Subdomain);
        assert_eq!(config.partition_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn rejects_empty_cluster_endpoints() {
        let config = AcetoneConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_retry_count() {
        let mut config = AcetoneConfig::default();
        config.cluster_endpoints.push("https://cluster.local:19080".into());
        config.retry_count = 0;
        assert!(config.validate().is_err());
    }
}
