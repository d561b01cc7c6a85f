//! Forwarding subsystem: the upstream leg of a request.
//!
//! # Data Flow
//! ```text
//! Dispatcher hands over (backend, request parts, buffered body)
//!     → client.rs (pooled hyper client, connect timeout, keep-alive)
//!     → dispatch() rewrites the URI to the backend authority and sends
//!     → response head returned with connect/header timings
//!     → body.rs relays the response through bounded buffers
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - The exchange deadline is the read timeout: the request body is
//!   already buffered, so transmission and the wait for the response
//!   head share one bounded future
//! - Connect failures are distinguished from all other upstream errors
//!   so the dispatcher can fall back to the next pool member once

pub mod body;
pub mod client;

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{request, response, Request, Uri};
use hyper_util::client::legacy::Client;

use crate::config::ForwardConfig;
use crate::forward::client::{build_client, ConnectTimes, TimedConnector};
use crate::observability::access_log::{AccessLogEntry, AccessLogger};
use crate::upstream::Backend;

pub use body::{buffer_request_body, RelayTimings};

/// Error type for the upstream leg.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Could not establish a connection to the selected backend.
    #[error("backend connection failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    /// The backend did not produce a response head within the deadline.
    #[error("backend response timed out")]
    ReadTimeout,

    /// The request body exceeds the configured maximum.
    #[error("request body exceeds configured maximum")]
    BodyTooLarge,

    /// The client's request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),

    /// The upstream request could not be constructed.
    #[error("failed to build upstream request: {0}")]
    Request(#[source] axum::http::Error),

    /// The exchange failed after the connection was established.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

/// A backend response head plus observed timings.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub parts: response::Parts,
    pub body: Body,
    /// Time to establish the connection; `None` when a pooled
    /// connection was reused.
    pub connect_time: Option<Duration>,
    /// Time from dispatch until the response head arrived.
    pub header_time: Duration,
}

/// Owns the backend connection lifecycle for single requests.
pub struct Forwarder {
    client: Client<TimedConnector, Body>,
    connect_times: ConnectTimes,
    config: ForwardConfig,
}

impl Forwarder {
    /// Create a forwarder from configuration.
    pub fn new(config: &ForwardConfig) -> Self {
        let connect_times = ConnectTimes::new();
        Self {
            client: build_client(config, connect_times.clone()),
            connect_times,
            config: config.clone(),
        }
    }

    /// Send a request to the chosen backend and await the response head.
    ///
    /// The caller provides already-rewritten request parts and the
    /// buffered body. The URI is re-targeted at the backend; everything
    /// else is forwarded as-is.
    pub async fn dispatch(
        &self,
        backend: &Backend,
        parts: &request::Parts,
        body: Bytes,
    ) -> Result<UpstreamResponse, ForwardError> {
        let authority = backend.authority();
        let uri = retarget_uri(&parts.uri, &authority);

        let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = parts.headers.clone();
        }
        let request = builder
            .body(Body::from(body))
            .map_err(ForwardError::Request)?;

        let dispatched_at = Instant::now();
        let read_timeout = Duration::from_secs(self.config.read_timeout_secs);

        let response = match tokio::time::timeout(read_timeout, self.client.request(request)).await
        {
            Err(_) => return Err(ForwardError::ReadTimeout),
            Ok(Err(e)) if e.is_connect() => return Err(ForwardError::Connect(e)),
            Ok(Err(e)) => return Err(ForwardError::Upstream(e)),
            Ok(Ok(response)) => response,
        };

        let header_time = dispatched_at.elapsed();
        let connect_time = self
            .connect_times
            .established_since(&authority, dispatched_at);

        let (parts, body) = response.into_parts();
        Ok(UpstreamResponse {
            parts,
            body: Body::new(body),
            connect_time,
            header_time,
        })
    }

    /// Relay a response body to the client with bounded buffering,
    /// emitting the finalized access log entry at completion.
    pub fn relay(
        &self,
        upstream: Body,
        logger: AccessLogger,
        entry: AccessLogEntry,
        timings: RelayTimings,
    ) -> Body {
        body::relay_response_body(upstream, &self.config, logger, entry, timings)
    }

    /// The forwarding configuration this forwarder was built with.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }
}

/// Rebuild a request URI against a backend authority.
fn retarget_uri(original: &Uri, authority: &str) -> Uri {
    let mut parts = original.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    if let Ok(authority) = authority.parse::<Authority>() {
        parts.authority = Some(authority);
    }
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts).unwrap_or_else(|_| original.clone())
}
