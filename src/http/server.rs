//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router and application state
//! - Accept connections through the bounded listener
//! - Dispatch: rate limit → body gate → pool select → header rewrite →
//!   forward → stream response → access log
//! - Graceful shutdown with connection draining
//!
//! Request state machine: received → rate-checked → backend selected →
//! forwarding → {completed | timed out | backend error | rate rejected |
//! body too large}. Every terminal state emits exactly one access log
//! entry.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::header::{CONTENT_LENGTH, REFERER, USER_AGENT},
    http::{request, HeaderMap, Method, Request, Response, StatusCode},
    routing::any,
    Router,
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::sync::broadcast;
use tower::{Service, ServiceExt};
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::forward::{self, ForwardError, Forwarder, RelayTimings, UpstreamResponse};
use crate::http::request::{RequestIdExt, RequestIdLayer};
use crate::http::response;
use crate::http::upgrade::{self, UpgradeOutcome};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::access_log::now_ms;
use crate::observability::{metrics, AccessLogEntry, AccessLogger, RequestOutcome};
use crate::security::headers::X_FORWARDED_FOR;
use crate::security::{is_upgrade_request, HeaderPolicy, RateLimiter};
use crate::upstream::UpstreamPool;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<UpstreamPool>,
    pub limiter: Arc<RateLimiter>,
    pub header_policy: Arc<HeaderPolicy>,
    pub forwarder: Arc<Forwarder>,
    pub access_log: AccessLogger,
}

/// HTTP server for the dispatch proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server around a resolved upstream pool.
    pub fn new(config: ProxyConfig, pool: Arc<UpstreamPool>, access_log: AccessLogger) -> Self {
        let state = AppState {
            pool,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            header_policy: Arc::new(HeaderPolicy::from_config(&config.headers)),
            forwarder: Arc::new(Forwarder::new(&config.forward)),
            access_log,
        };

        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown signal fires.
    ///
    /// Accepts through the bounded listener; each connection holds its
    /// permit and tracker guard for its whole lifetime, so shutdown can
    /// drain in-flight work.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, "HTTP server starting");

        let tracker = ConnectionTracker::new();
        let mut make_service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer_addr, permit) = match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    // Transient accept failures must not take the proxy
                    // down; liveness is independent of any one socket.
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };
            metrics::record_active_connections(
                listener.max_connections() - listener.available_permits(),
            );

            let service = unwrap_infallible(make_service.call(peer_addr).await);
            let guard = tracker.track();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let hyper_service =
                    hyper::service::service_fn(move |request: Request<hyper::body::Incoming>| {
                        service.clone().oneshot(request.map(Body::new))
                    });

                let served = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection_with_upgrades(io, hyper_service)
                    .await;
                if let Err(e) = served {
                    tracing::debug!(peer = %peer_addr, error = %e, "Connection ended with error");
                }
                drop(guard);
                drop(permit);
            });
        }

        tracing::info!(
            active = tracker.active_count(),
            "Listener stopped; draining connections"
        );
        tokio::select! {
            _ = tracker.wait_for_drain() => {
                tracing::info!("All connections drained");
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => {
                tracing::warn!(active = tracker.active_count(), "Drain deadline reached; closing");
            }
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => match err {},
    }
}

fn header_str(headers: &HeaderMap, name: axum::http::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Emit the access log entry for a terminal state reached before (or
/// instead of) response streaming.
fn emit_terminal(
    access_log: &AccessLogger,
    mut entry: AccessLogEntry,
    status: StatusCode,
    outcome: RequestOutcome,
    received_at: Instant,
) {
    entry.timestamp_ms = now_ms();
    entry.status = status.as_u16();
    entry.outcome = outcome;
    entry.request_time_ms = millis(received_at.elapsed());
    access_log.emit(entry);
}

/// Main dispatch handler: one invocation per proxied request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let received_at = Instant::now();
    let request_id = request.request_id().unwrap_or("unknown").to_string();
    let method = request.method().clone();
    let protocol = format!("{:?}", request.version());
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let entry = AccessLogEntry {
        timestamp_ms: 0,
        client_ip: peer_addr.ip().to_string(),
        forwarded_for: None,
        protocol: protocol.clone(),
        request: format!("{} {} {}", method, path, protocol),
        status: 0,
        body_bytes_sent: 0,
        referer: header_str(request.headers(), REFERER),
        user_agent: header_str(request.headers(), USER_AGENT),
        request_time_ms: 0.0,
        upstream_addr: None,
        upstream_connect_time_ms: None,
        upstream_header_time_ms: None,
        upstream_response_time_ms: None,
        request_id: request_id.clone(),
        outcome: RequestOutcome::Completed,
    };

    // Admit or reject immediately; admitted requests are never delayed.
    if !state.limiter.check(peer_addr.ip()) {
        tracing::debug!(client = %peer_addr.ip(), request_id = %request_id, "Rate limit exceeded");
        metrics::record_rate_limited("per_ip");
        metrics::record_request(method.as_str(), 429, "none", received_at);
        emit_terminal(
            &state.access_log,
            entry,
            StatusCode::TOO_MANY_REQUESTS,
            RequestOutcome::RateRejected,
            received_at,
        );
        return response::error_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
    }

    let (mut parts, body) = request.into_parts();
    let wants_upgrade = is_upgrade_request(&parts.headers);
    let client_upgrade = parts.extensions.remove::<OnUpgrade>();

    // Buffer the request body before any byte reaches a backend.
    // Upgrade requests carry none.
    let body_bytes = if wants_upgrade {
        Bytes::new()
    } else {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        match forward::buffer_request_body(body, declared, state.forwarder.config()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let (status, outcome) = response::classify(&e);
                tracing::debug!(request_id = %request_id, error = %e, "Request body rejected");
                metrics::record_request(method.as_str(), status.as_u16(), "none", received_at);
                emit_terminal(&state.access_log, entry, status, outcome, received_at);
                return response::error_response(status, response::status_message(status));
            }
        }
    };

    // Rewrite forwarded headers for the upstream leg.
    state.header_policy.rewrite(&mut parts.headers, peer_addr);
    let mut entry = entry;
    entry.forwarded_for = header_str(&parts.headers, X_FORWARDED_FOR);

    // Protocol upgrades bypass buffering and the connect fallback.
    if wants_upgrade {
        if let Some(client_upgrade) = client_upgrade {
            return handle_upgrade(state, parts, client_upgrade, entry, method, received_at).await;
        }
    }

    // One fallback to the next pool member, only on connect failure.
    let max_attempts = 2;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(backend) = state.pool.select() else {
            tracing::error!(request_id = %request_id, "Upstream pool is empty");
            metrics::record_request(method.as_str(), 503, "none", received_at);
            emit_terminal(
                &state.access_log,
                entry,
                StatusCode::SERVICE_UNAVAILABLE,
                RequestOutcome::BackendError,
                received_at,
            );
            return response::error_response(StatusCode::SERVICE_UNAVAILABLE, "No backends available");
        };

        let mut attempt_entry = entry.clone();
        attempt_entry.upstream_addr = Some(backend.authority());
        let dispatched_at = Instant::now();

        match state.forwarder.dispatch(&backend, &parts, body_bytes.clone()).await {
            Ok(upstream) => {
                return stream_response(
                    &state,
                    upstream,
                    attempt_entry,
                    &method,
                    received_at,
                    dispatched_at,
                );
            }
            Err(ForwardError::Connect(e)) if attempt < max_attempts => {
                tracing::warn!(
                    request_id = %request_id,
                    backend = %backend,
                    error = %e,
                    "Backend connect failed; trying next pool member"
                );
                continue;
            }
            Err(e) => {
                let (status, outcome) = response::classify(&e);
                tracing::error!(
                    request_id = %request_id,
                    backend = %backend,
                    error = %e,
                    "Upstream request failed"
                );
                metrics::record_request(
                    method.as_str(),
                    status.as_u16(),
                    &backend.authority(),
                    received_at,
                );
                emit_terminal(&state.access_log, attempt_entry, status, outcome, received_at);
                return response::error_response(status, response::status_message(status));
            }
        }
    }
}

/// Forward an upgrade request; on 101 the copy task owns both streams.
async fn handle_upgrade(
    state: AppState,
    parts: request::Parts,
    client_upgrade: OnUpgrade,
    mut entry: AccessLogEntry,
    method: Method,
    received_at: Instant,
) -> Response<Body> {
    let Some(backend) = state.pool.select() else {
        metrics::record_request(method.as_str(), 503, "none", received_at);
        emit_terminal(
            &state.access_log,
            entry,
            StatusCode::SERVICE_UNAVAILABLE,
            RequestOutcome::BackendError,
            received_at,
        );
        return response::error_response(StatusCode::SERVICE_UNAVAILABLE, "No backends available");
    };
    entry.upstream_addr = Some(backend.authority());
    let dispatched_at = Instant::now();

    match upgrade::proxy_upgrade(&state.forwarder, &backend, &parts, client_upgrade).await {
        Ok(UpgradeOutcome::Switched(response)) => {
            metrics::record_request(method.as_str(), 101, &backend.authority(), received_at);
            emit_terminal(
                &state.access_log,
                entry,
                StatusCode::SWITCHING_PROTOCOLS,
                RequestOutcome::Completed,
                received_at,
            );
            response
        }
        Ok(UpgradeOutcome::Declined(upstream)) => {
            stream_response(&state, upstream, entry, &method, received_at, dispatched_at)
        }
        Err(e) => {
            let (status, outcome) = response::classify(&e);
            tracing::error!(backend = %backend, error = %e, "Upgrade dispatch failed");
            metrics::record_request(method.as_str(), status.as_u16(), &backend.authority(), received_at);
            emit_terminal(&state.access_log, entry, status, outcome, received_at);
            response::error_response(status, response::status_message(status))
        }
    }
}

/// Turn an upstream response into the client response, streaming the body
/// through bounded buffers. The relay finalizes and emits the log entry.
fn stream_response(
    state: &AppState,
    upstream: UpstreamResponse,
    mut entry: AccessLogEntry,
    method: &Method,
    received_at: Instant,
    dispatched_at: Instant,
) -> Response<Body> {
    let UpstreamResponse {
        mut parts,
        body,
        connect_time,
        header_time,
    } = upstream;

    response::strip_hop_by_hop(&mut parts.headers);

    let backend_label = entry.upstream_addr.clone().unwrap_or_else(|| "none".into());
    metrics::record_request(method.as_str(), parts.status.as_u16(), &backend_label, received_at);

    entry.status = parts.status.as_u16();
    entry.upstream_connect_time_ms = connect_time.map(millis);
    entry.upstream_header_time_ms = Some(millis(header_time));

    let relayed = state.forwarder.relay(
        body,
        state.access_log.clone(),
        entry,
        RelayTimings {
            received_at,
            dispatched_at,
        },
    );
    Response::from_parts(parts, relayed)
}
