//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Forwarder trait and the reqwest-backed default implementation."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

/// Forwards an already-resolved request to its destination. Connection
/// pooling and TLS termination are the implementation's responsibility;
/// [`ReqwestForwarder`] delegates both to `reqwest`.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        resolved_base: &str,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response;
}

/// Default forwarder: rebuilds the inbound request against the resolved
/// base URL, joined with the original path and query, and replays it with
/// a shared `reqwest::Client`.
pub struct ReqwestForwarder {
    client: reqwest::Client,
}

impl ReqwestForwarder {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl Default for ReqwestForwarder {
    fn default() -> Self {
        Self::new().expect("default reqwest client configuration is always valid")
    }
}

#[async_trait]
impl Forwarder for ReqwestForwarder {
    async fn forward(
        &self,
        resolved_base: &str,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let target = match join_url(resolved_base, uri) {
            Ok(url) => url,
            Err(err) => {
                error!(resolved_base, error = %err, "resolved address is not a valid forward target");
                return (StatusCode::INTERNAL_SERVER_ERROR, "invalid forward target").into_response();
            }
        };

        let mut request = self.client.request(method, target).body(body);
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(upstream) => {
                let status = StatusCode::from_u16(upstream.status().as_u16())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                let mut response_headers = HeaderMap::new();
                for (name, value) in upstream.headers().iter() {
                    response_headers.insert(name.clone(), value.clone());
                }
                let stream = upstream.bytes_stream();
                let mut response = Response::builder().status(status);
                {
                    let builder_headers = response.headers_mut().expect("builder headers present");
                    *builder_headers = response_headers;
                }
                response
                    .body(Body::from_stream(stream))
                    .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
            }
            Err(err) => {
                warn!(target = %resolved_base, error = %err, "upstream forward failed");
                (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
            }
        }
    }
}

fn join_url(resolved_base: &str, uri: &Uri) -> anyhow::Result<url::Url> {
    let base = url::Url::parse(resolved_base)?;
    let mut target = base;
    target.set_path(uri.path());
    target.set_query(uri.query());
    Ok(target)
}
