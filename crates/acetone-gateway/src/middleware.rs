//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Routing middleware: identifier extraction, resolution, status mapping, forward."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use acetone_common::ProxyError;
use acetone_resolver::ResolutionRequest;
use acetone_url::extract_identifier;
use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use uuid::Uuid;

use crate::state::{extraction_mode, GatewayState};

const CORRELATION_HEADER: &str = "x-correlation-id";
const VERSION_HEADER: &str = "x-acetone-version";

/// Entry point for every inbound request. Admission control, identifier
/// extraction, resolution, and forwarding all happen here, in that order.
pub async fn route(State(state): State<Arc<GatewayState>>, request: Request) -> Response {
    let Ok(_permit) = state.admission.clone().try_acquire_owned() else {
        warn!("admission control rejected request: no permits available");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many concurrent requests").into_response();
    };

    let correlation_id = correlation_id_for(request.headers());
    let mode = extraction_mode(state.identifier_location);
    let raw_url = identifier_input(&request);

    let identifier = match extract_identifier(&raw_url, mode) {
        Ok(id) => id,
        Err(err) => {
            warn!(url = %raw_url, error = %err, "identifier extraction failed");
            return with_standard_headers(
                (StatusCode::BAD_REQUEST, "could not extract an application identifier")
                    .into_response(),
                &correlation_id,
                &state.acetone_version,
            );
        }
    };

    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "failed to buffer inbound request body");
            return with_standard_headers(
                (StatusCode::BAD_REQUEST, "could not read request body").into_response(),
                &correlation_id,
                &state.acetone_version,
            );
        }
    };

    let resolution_request = ResolutionRequest {
        identifier,
        invocation_id: correlation_id.clone(),
        version: None,
        refresh: false,
    };

    let resolved = state.resolver.resolve_endpoint(resolution_request).await;
    let resolved_base = match resolved {
        Ok(url) => {
            state.readiness.mark_ready();
            url
        }
        Err(err) => {
            if matches!(
                err,
                ProxyError::CircuitOpen(_) | ProxyError::TransientFault(_) | ProxyError::Timeout(_)
            ) {
                state.readiness.mark_unready();
            }
            return with_standard_headers(
                resolution_error_response(&err),
                &correlation_id,
                &state.acetone_version,
            )
        }
    };

    let mut forward_headers = parts.headers.clone();
    strip_sensitive_headers(&mut forward_headers, &state.sensitive_headers);

    let response = state
        .forwarder
        .forward(&resolved_base, parts.method, &parts.uri, forward_headers, body_bytes)
        .await;

    with_standard_headers(response, &correlation_id, &state.acetone_version)
}

/// Maps a resolution failure to the HTTP status the routing middleware
/// surfaces to the caller.
fn resolution_error_response(err: &ProxyError) -> Response {
    let status = match err {
        ProxyError::ApplicationNotFound(_) | ProxyError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
        ProxyError::AmbiguousService(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
        ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProxyError::CircuitOpen(_) | ProxyError::TransientFault(_) => StatusCode::SERVICE_UNAVAILABLE,
        ProxyError::MalformedEndpoint(_) | ProxyError::PermanentFault(_) | ProxyError::Canceled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!(kind = err.kind(), error = %err, "resolution failed");
    (status, err.to_string()).into_response()
}

/// Reconstructs a `scheme://host/path?query` string for identifier
/// extraction. `Request::uri()` carries only path and query for an
/// origin-form request (what every non-proxy-aware client sends); the host
/// lives in the `Host` header instead. Falls back to the URI's own
/// authority for the proxy-form case where one is present.
fn identifier_input(request: &Request) -> String {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let host = request
        .uri()
        .authority()
        .map(|authority| authority.as_str().to_owned())
        .or_else(|| {
            request
                .headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_owned())
        })
        .unwrap_or_default();
    format!("https://{}{}", host, path_and_query)
}

fn correlation_id_for(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_owned())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn with_standard_headers(mut response: Response, correlation_id: &str, version: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(version) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(VERSION_HEADER), value);
    }
    response
}

fn strip_sensitive_headers(headers: &mut HeaderMap, sensitive: &[String]) {
    for name in sensitive {
        headers.remove(name.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::Forwarder;
    use crate::state::GatewayConfig;
    use acetone_common::config::IdentifierLocation;
    use acetone_registry::{Application, ApplicationStatus, InMemoryRegistry, Partition, Service, ServiceKind};
    use acetone_resolver::{Resolver, ResolverConfig};
    use axum::body::Bytes;
    use axum::http::{Method, Uri};
    use std::net::SocketAddr;

    struct EchoForwarder;

    #[async_trait::async_trait]
    impl Forwarder for EchoForwarder {
        async fn forward(
            &self,
            resolved_base: &str,
            _method: Method,
            _uri: &Uri,
            _headers: HeaderMap,
            _body: Bytes,
        ) -> Response {
            (StatusCode::OK, resolved_base.to_owned()).into_response()
        }
    }

    fn seeded_state() -> Arc<GatewayState> {
        let registry = InMemoryRegistry::new();
        registry.register_application(Application {
            name: "fabric:/Guard".to_owned(),
            type_name: "GuardType".to_owned(),
            type_version: "1.0.0".to_owned(),
            status: ApplicationStatus::Ready,
        });
        registry.register_service(
            "fabric:/Guard",
            Service {
                name: "fabric:/Guard/GuardApi".to_owned(),
                type_name: "GuardApiType".to_owned(),
                kind: ServiceKind::Stateless,
            },
        );
        registry.set_partition(Partition {
            service_name: "fabric:/Guard/GuardApi".to_owned(),
            endpoint_address: "http://10.0.0.5:8080/".to_owned(),
        });

        let resolver = Arc::new(Resolver::new(Arc::new(registry), ResolverConfig::default(), None));
        let config = GatewayConfig {
            listen: "0.0.0.0:0".parse::<SocketAddr>().unwrap(),
            identifier_location: IdentifierLocation::Subdomain,
            sensitive_headers: vec!["authorization".to_owned()],
            max_concurrent_requests: 10,
            acetone_version: "test+0000000".to_owned(),
        };
        Arc::new(GatewayState::new(resolver, Arc::new(EchoForwarder), &config))
    }

    fn request(uri: &str) -> axum::extract::Request {
        axum::extract::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    /// Builds a request the way a real HTTP/1.1 client does: `uri()` is
    /// origin-form (path and query only) and the host lives in the `Host`
    /// header, not in the request line.
    fn origin_form_request(host: &str, path_and_query: &str) -> axum::extract::Request {
        axum::extract::Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .header(HOST, host)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn resolved_request_is_forwarded_with_standard_headers() {
        let state = seeded_state();
        let response = route(State(state), request("http://guard.cluster.internal/api/ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        assert_eq!(
            response.headers().get(VERSION_HEADER).unwrap(),
            "test+0000000"
        );
    }

    #[tokio::test]
    async fn origin_form_request_uses_host_header_for_subdomain_extraction() {
        let state = seeded_state();
        let response = route(
            State(state),
            origin_form_request("guard.cluster.internal", "/api/ping"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_application_maps_to_404() {
        let state = seeded_state();
        let response = route(State(state), request("http://unknown.cluster.internal/api/ping")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inbound_correlation_id_is_preserved() {
        let state = seeded_state();
        let mut req = request("http://guard.cluster.internal/api/ping");
        req.headers_mut()
            .insert(CORRELATION_HEADER, HeaderValue::from_static("caller-supplied-id"));
        let response = route(State(state), req).await;
        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "caller-supplied-id"
        );
    }

    #[tokio::test]
    async fn exhausted_admission_control_returns_503() {
        let state = seeded_state();
        let _permits: Vec<_> = (0..10)
            .map(|_| state.admission.clone().try_acquire_owned().unwrap())
            .collect();
        let response = route(State(state), request("http://guard.cluster.internal/api/ping")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
