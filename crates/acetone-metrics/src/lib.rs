//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(encoder.format_type()),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Every metric family the resolution pipeline emits, registered once at
/// startup and threaded through the cache, resilience pipeline, and
/// resolver.
#[derive(Clone)]
pub struct Telemetry {
    registry: SharedRegistry,
    resolutions_total: IntCounterVec,
    resolution_duration_seconds: Histogram,
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    registry_calls_total: IntCounterVec,
    registry_call_duration_seconds: HistogramVec,
    retry_attempts_total: IntCounter,
    circuit_state: GaugeVec,
}

impl Telemetry {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "resolutions_total",
                "Total number of identifier resolutions, labeled by outcome",
            ),
            &["status"],
        )?;
        registry.register(Box::new(resolutions_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct resolution duration buckets")?;
        let resolution_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "resolution_duration_seconds",
                "Time spent resolving an identifier to an endpoint",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(resolution_duration_seconds.clone()))?;

        let cache_hits_total = IntCounterVec::new(
            Opts::new("cache_hits_total", "Cache hits, labeled by tier"),
            &["tier"],
        )?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = IntCounterVec::new(
            Opts::new("cache_misses_total", "Cache misses, labeled by tier"),
            &["tier"],
        )?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let registry_calls_total = IntCounterVec::new(
            Opts::new(
                "registry_calls_total",
                "Registry calls issued, labeled by operation",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(registry_calls_total.clone()))?;

        let call_buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct registry call duration buckets")?;
        let registry_call_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "registry_call_duration_seconds",
                "Registry call latency, labeled by operation",
            )
            .buckets(call_buckets),
            &["operation"],
        )?;
        registry.register(Box::new(registry_call_duration_seconds.clone()))?;

        let retry_attempts_total = IntCounter::with_opts(Opts::new(
            "retry_attempts_total",
            "Total number of retry attempts issued by the resilience pipeline",
        ))?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let circuit_state = GaugeVec::new(
            Opts::new(
                "circuit_state",
                "Current circuit breaker state (0=closed, 1=open, 2=half-open)",
            ),
            &["state"],
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        Ok(Self {
            registry,
            resolutions_total,
            resolution_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            registry_calls_total,
            registry_call_duration_seconds,
            retry_attempts_total,
            circuit_state,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_resolution(&self, status: &str, duration: Duration) {
        self.resolutions_total.with_label_values(&[status]).inc();
        self.resolution_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_cache_hit(&self, tier: &str) {
        self.cache_hits_total.with_label_values(&[tier]).inc();
    }

    pub fn record_cache_miss(&self, tier: &str) {
        self.cache_misses_total.with_label_values(&[tier]).inc();
    }

    pub fn record_registry_call(&self, operation: &str, duration: Duration) {
        self.registry_calls_total.with_label_values(&[operation]).inc();
        self.registry_call_duration_seconds
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    pub fn record_retry(&self) {
        self.retry_attempts_total.inc();
    }

    /// Record the breaker's current state as a gauge set (0=closed,
    /// 1=open, 2=half-open); clears the other two labels to 0 so only one
    /// state reads as active at a time.
    pub fn set_circuit_state(&self, state: &str) {
        for candidate in ["closed", "open", "half_open"] {
            let value = if candidate == state { 1.0 } else { 0.0 };
            self.circuit_state.with_label_values(&[candidate]).set(value);
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

pub use prometheus;
