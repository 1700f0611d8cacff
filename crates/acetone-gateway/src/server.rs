//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Router assembly, health endpoints, and the gateway server spawn/shutdown handle."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::middleware::route;
use crate::state::GatewayState;

async fn live() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<Arc<GatewayState>>) -> StatusCode {
    if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health/live", any(live))
        .route("/health/ready", any(ready))
        .fallback(route)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Handle to the running gateway server.
#[derive(Debug)]
pub struct GatewayServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl GatewayServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the public HTTP surface: the catch-all routing middleware plus the
/// liveness/readiness probes, bound to `addr`.
pub fn spawn_gateway_server(state: Arc<GatewayState>, addr: SocketAddr) -> Result<GatewayServer> {
    let router = build_router(state);

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind gateway listener {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure gateway listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .context("failed to convert std listener into tokio listener")?;

    info!(address = %addr, "gateway server listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "gateway server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(GatewayServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}
