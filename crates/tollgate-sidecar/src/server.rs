//! Sidecar HTTP server implementation.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;
use tollgate_authz::{Gatekeeper, RequestInfo};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::SidecarConfig;
use crate::error::{ErrorResponse, SidecarError, SidecarResult};
use crate::headers::{authz_headers, request_id, HEADER_REQUEST_ID};
use crate::health::HealthChecker;
use crate::identity::extract_principal;
use crate::proxy::{ProxyClient, ProxyRequest};
use crate::telemetry;

/// Prefix of the sidecar's own endpoints.
pub const INTERNAL_PREFIX: &str = "/_tollgate/";

/// Shared per-process state.
struct AppState {
    config: SidecarConfig,
    gatekeeper: Arc<Gatekeeper>,
    proxy: ProxyClient,
    health: HealthChecker,
}

/// Sidecar server.
pub struct SidecarServer {
    state: Arc<AppState>,
}

impl SidecarServer {
    /// Create a new sidecar server.
    pub fn new(config: SidecarConfig) -> SidecarResult<Self> {
        let gatekeeper = Arc::new(Gatekeeper::new(config.authorization.clone())?);
        let proxy = ProxyClient::new(&config)?;
        let health = HealthChecker::new(
            config.authorization.coarse.is_active(),
            config.authorization.fine_grain.is_active(),
        );

        Ok(Self {
            state: Arc::new(AppState {
                config,
                gatekeeper,
                proxy,
                health,
            }),
        })
    }

    /// Handle used to reload authorization rules while serving.
    pub fn gatekeeper(&self) -> Arc<Gatekeeper> {
        Arc::clone(&self.state.gatekeeper)
    }

    /// Bind the configured address and serve.
    pub async fn run(self) -> SidecarResult<()> {
        let settings = &self.state.config.sidecar;
        let addr = SocketAddr::new(
            settings
                .listen_addr
                .parse()
                .map_err(|e| SidecarError::config(format!("invalid listen address: {e}")))?,
            settings.listen_port,
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SidecarError::server(format!("failed to bind: {e}")))?;

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> SidecarResult<()> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            upstream = %self.state.config.sidecar.upstream_url,
            "Tollgate sidecar listening"
        );

        self.state.health.set_ready(true);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(handle_request(req, state, peer_addr).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(error = %e, "connection error");
                }
            });
        }
    }
}

/// Handle an incoming request.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = request_id(req.headers());

    let span = tracing::info_span!(
        "request",
        service = %state.config.telemetry.service_name,
        request_id = %request_id,
        method = %method,
        path = %path,
        peer = %peer_addr,
    );

    async move {
        if path.starts_with(INTERNAL_PREFIX) {
            return handle_internal_endpoint(
                &path,
                &state.health,
                &state.config.telemetry.service_name,
            );
        }

        let response = match process(req, &state, &request_id).await {
            Ok(response) => response,
            Err(e) => {
                let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                } else {
                    warn!(error = %e, "request rejected");
                }
                error_response(status, &e, &request_id)
            }
        };

        let duration = start.elapsed();
        telemetry::record_request(method.as_str(), response.status().as_u16(), duration);
        info!(
            status = response.status().as_u16(),
            duration_ms = %duration.as_millis(),
            "request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Authorize, then forward.
async fn process(
    req: Request<Incoming>,
    state: &AppState,
    request_id: &str,
) -> SidecarResult<Response<Full<Bytes>>> {
    let principal = extract_principal(req.headers(), &state.config.identity)?;

    let (parts, body) = req.into_parts();
    let body = read_body(&parts.headers, body, state.config.sidecar.max_request_body_size).await?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
    let mut authz_headers = authz_headers(&parts.headers);
    authz_headers.insert(HEADER_REQUEST_ID.as_str().to_string(), request_id.to_string());

    let request_info = RequestInfo {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        full_url: full_url(&parts.uri, &parts.headers, &path_and_query),
        headers: authz_headers,
    };
    let body_json = parse_body(&body);

    match state.gatekeeper.authorize(&request_info, &principal, &body_json).await {
        Ok(verdict) if verdict.allowed => {
            telemetry::record_authz_decision("allow");
            debug!(principal = %principal.log_id(), reason = %verdict.reason, "authorized");
        }
        Ok(verdict) => {
            telemetry::record_authz_decision("deny");
            return Err(SidecarError::authorization_denied(verdict.reason));
        }
        Err(e) => {
            telemetry::record_authz_decision(e.kind().as_str());
            return Err(e.into());
        }
    }

    let proxy_req = ProxyRequest::new(parts.method, path_and_query, request_id)
        .with_headers(parts.headers)
        .with_body(body);
    let upstream = state.proxy.forward(proxy_req).await?;

    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    set_request_id_header(&mut response, request_id);
    Ok(response)
}

/// Buffer the body, refusing anything over `limit` bytes.
async fn read_body(headers: &http::HeaderMap, body: Incoming, limit: usize) -> SidecarResult<Bytes> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(SidecarError::PayloadTooLarge { limit });
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(SidecarError::PayloadTooLarge { limit })
        }
        Err(e) => Err(SidecarError::bad_request(format!("failed to read request body: {e}"))),
    }
}

/// Body as JSON: empty is `{}`, anything unparseable is `null`.
fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// Absolute URL of the inbound request, as far as it can be known.
fn full_url(uri: &http::Uri, headers: &http::HeaderMap, path_and_query: &str) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{path_and_query}"),
        None => path_and_query.to_string(),
    }
}

/// Handle internal sidecar endpoints.
fn handle_internal_endpoint(
    path: &str,
    health: &HealthChecker,
    service_name: &str,
) -> Response<Full<Bytes>> {
    match path {
        "/_tollgate/health" => json_response(StatusCode::OK, &health.liveness()),
        "/_tollgate/ready" => {
            let response = health.readiness();
            let status = if response.status == crate::health::ReadinessStatus::Ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json_response(status, &response)
        }
        "/_tollgate/metrics" => match telemetry::render_metrics() {
            Some(body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
                response
            }
            None => json_response(
                StatusCode::NOT_FOUND,
                &ErrorResponse::new("not_found", "metrics are disabled"),
            ),
        },
        "/_tollgate/version" => {
            let version = serde_json::json!({
                "name": service_name,
                "version": crate::VERSION,
            });
            json_response(StatusCode::OK, &version)
        }
        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse::new("not_found", format!("unknown internal endpoint: {path}")),
        ),
    }
}

/// Create a JSON response.
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Create an error response.
fn error_response(status: StatusCode, err: &SidecarError, request_id: &str) -> Response<Full<Bytes>> {
    let body = ErrorResponse::from(err).with_request_id(request_id);
    let mut response = json_response(status, &body);
    set_request_id_header(&mut response, request_id);
    response
}

fn set_request_id_header(response: &mut Response<Full<Bytes>>, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(HEADER_REQUEST_ID.clone(), value);
    }
}
