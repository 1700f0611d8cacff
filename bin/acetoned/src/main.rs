//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the acetone daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use acetone_common::config::AcetoneConfig;
use acetone_common::logging::init_tracing;
use acetone_common::version::VersionInfo;
use acetone_gateway::{spawn_gateway_server, GatewayConfig, GatewayState, ReqwestForwarder};
use acetone_metrics::{new_registry, spawn_http_server, Telemetry};
use acetone_registry::{InMemoryRegistry, RegistryPort};
use acetone_resolver::{Resolver, ResolverConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("acetone ", env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")"),
    about = "acetone dynamic reverse proxy",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        default_value_t = Mode::Production,
        help = "Registry backend to run against"
    )]
    mode: Mode,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Which registry backend the daemon wires up. Mirrors the teacher's
/// production/simulation split; `Simulation` runs against the bundled
/// in-memory registry double, `Production` expects a real cluster client
/// (not bundled — the cluster client library is a pluggable interface
/// beyond this crate's boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Production,
    Simulation,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Production => write!(f, "production"),
            Mode::Simulation => write!(f, "simulation"),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the proxy")]
    Run,
    #[command(about = "Load and validate configuration, then exit")]
    ConfigCheck,
    #[command(about = "Print version information and exit")]
    Version,
}

fn config_candidates(explicit: Option<&PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/acetone.toml"));
    candidates.push(PathBuf::from("/etc/acetone/acetone.toml"));
    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Version => {
            println!("{}", version.cli_string());
            return Ok(());
        }
        Commands::ConfigCheck => {
            let loaded = AcetoneConfig::load_with_source(&config_candidates(cli.config.as_ref()))
                .context("failed to load configuration")?;
            loaded.config.validate().context("configuration is invalid")?;
            println!("configuration OK ({})", loaded.source.display());
            return Ok(());
        }
        Commands::Run => run(cli.config, cli.mode, version).await,
    }
}

async fn run(config_path: Option<PathBuf>, mode: Mode, version: VersionInfo) -> Result<()> {
    let loaded = AcetoneConfig::load_with_source(&config_candidates(config_path.as_ref()))
        .context("failed to load configuration")?;
    let config = loaded.config;
    config.validate().context("configuration is invalid")?;

    init_tracing("acetoned", &config.logging)?;
    info!(source = %loaded.source.display(), "configuration loaded");

    let metrics_registry = new_registry();
    let telemetry = Telemetry::new(metrics_registry.clone())?;

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(metrics_registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let registry: Arc<dyn RegistryPort> = match mode {
        Mode::Simulation => {
            info!("mode=simulation: serving from the in-memory registry double");
            if config.cluster_endpoints.is_empty() {
                warn!("no cluster_endpoints configured; running against an empty in-memory registry");
            }
            Arc::new(InMemoryRegistry::new())
        }
        Mode::Production => {
            bail!(
                "mode=production requires a real cluster registry client, which this build does not bundle; \
                 pass --mode simulation to run against the in-memory development backend"
            );
        }
    };

    let resolver_config = ResolverConfig {
        partition_cache_ttl: config.partition_cache_ttl,
        disable_partition_cache: config.disable_partition_cache,
        retry_count: config.retry_count,
        initial_retry_delay: config.initial_retry_delay,
        max_retry_delay: config.max_retry_delay,
        per_attempt_timeout: config.per_attempt_timeout,
        circuit_breaker_failure_threshold: config.circuit_breaker_failure_threshold,
        circuit_breaker_break_duration: config.circuit_breaker_break_duration,
        circuit_breaker_sampling_duration: config.circuit_breaker_sampling_duration,
    };
    let resolver = Arc::new(Resolver::new(registry, resolver_config, Some(telemetry)));
    let notification_task = resolver.spawn_notification_task();

    let forwarder = Arc::new(ReqwestForwarder::new()?);
    let gateway_config = GatewayConfig {
        listen: config.listen,
        identifier_location: config.identifier_location,
        sensitive_headers: config.sensitive_headers.names.clone(),
        max_concurrent_requests: config.max_concurrent_requests,
        acetone_version: version.header_value(),
    };
    let gateway_state = Arc::new(GatewayState::new(resolver, forwarder, &gateway_config));
    let gateway_server = spawn_gateway_server(gateway_state, gateway_config.listen)?;

    info!(address = %gateway_server.addr(), "proxy accepting requests; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("shutdown signal received; draining in-flight requests");

    gateway_server.shutdown().await?;
    notification_task.abort();
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    info!("shutdown complete");
    Ok(())
}
