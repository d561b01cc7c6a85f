//! Upstream HTTP client construction.
//!
//! # Responsibilities
//! - Build the pooled hyper client used for all backend requests
//! - Enforce the connect timeout at the connector
//! - Record connection-establishment timing for the access log
//!
//! # Design Decisions
//! - One shared client; the pool reuses idle backend connections up to
//!   the configured keep-alive timeout
//! - Connect timing is observed by wrapping the connector, keyed by
//!   authority; a pooled (reused) connection reports no connect time

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Uri;
use dashmap::DashMap;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tower::Service;

use crate::config::ForwardConfig;

/// When a fresh connection to an authority was established, and how long
/// the handshake took.
#[derive(Debug, Clone, Copy)]
pub struct ConnectSample {
    pub at: Instant,
    pub took: Duration,
}

/// Shared record of the most recent connect per authority.
#[derive(Debug, Clone, Default)]
pub struct ConnectTimes {
    inner: Arc<DashMap<String, ConnectSample>>,
}

impl ConnectTimes {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, authority: String, sample: ConnectSample) {
        self.inner.insert(authority, sample);
    }

    /// Connect duration for `authority` if a connection was established
    /// at or after `since`. Reused pooled connections yield `None`.
    pub fn established_since(&self, authority: &str, since: Instant) -> Option<Duration> {
        self.inner
            .get(authority)
            .filter(|sample| sample.at >= since)
            .map(|sample| sample.took)
    }
}

/// An `HttpConnector` that records how long each connect took.
#[derive(Debug, Clone)]
pub struct TimedConnector {
    inner: HttpConnector,
    times: ConnectTimes,
}

impl TimedConnector {
    pub fn new(connect_timeout: Duration, times: ConnectTimes) -> Self {
        let mut inner = HttpConnector::new();
        inner.set_connect_timeout(Some(connect_timeout));
        inner.set_nodelay(true);
        Self { inner, times }
    }
}

impl Service<Uri> for TimedConnector {
    type Response = TokioIo<TcpStream>;
    type Error = <HttpConnector as Service<Uri>>::Error;
    type Future = futures_util::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let times = self.times.clone();
        let connecting = self.inner.call(uri);

        Box::pin(async move {
            let started = Instant::now();
            let io = connecting.await?;
            times.record(
                authority,
                ConnectSample {
                    at: Instant::now(),
                    took: started.elapsed(),
                },
            );
            Ok(io)
        })
    }
}

/// Build the pooled upstream client.
pub fn build_client(config: &ForwardConfig, times: ConnectTimes) -> Client<TimedConnector, Body> {
    let connector = TimedConnector::new(
        Duration::from_secs(config.connect_timeout_secs),
        times,
    );
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(config.keepalive_timeout_secs))
        .build(connector)
}
