//! Protocol-upgrade pass-through.
//!
//! # Responsibilities
//! - Forward upgrade requests (e.g. WebSocket) to the selected backend
//! - Join the two upgraded streams with a bidirectional copy
//!
//! # Data Flow
//! ```text
//! Client ←──── upgraded byte stream ────→ Proxy ←──── upgraded byte stream ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level forwarding after the 101; the proxy does not interpret
//!   frames, which covers WebSocket and any other upgrade alike
//! - A backend that declines the upgrade produces a normal response
//! - Either side closing tears down both directions

use axum::body::{Body, Bytes};
use axum::http::{request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use crate::forward::{ForwardError, Forwarder, UpstreamResponse};
use crate::upstream::Backend;

/// Outcome of an upgrade dispatch.
pub enum UpgradeOutcome {
    /// The backend switched protocols; the 101 response is ready to
    /// return and the copy task is running.
    Switched(Response<Body>),
    /// The backend answered with a regular response.
    Declined(UpstreamResponse),
}

/// Forward an upgrade request and, on 101, splice the two connections.
pub async fn proxy_upgrade(
    forwarder: &Forwarder,
    backend: &Backend,
    parts: &request::Parts,
    client_upgrade: OnUpgrade,
) -> Result<UpgradeOutcome, ForwardError> {
    let upstream = forwarder.dispatch(backend, parts, Bytes::new()).await?;

    if upstream.parts.status != StatusCode::SWITCHING_PROTOCOLS {
        return Ok(UpgradeOutcome::Declined(upstream));
    }

    let UpstreamResponse { parts: head, body, .. } = upstream;
    let mut upstream_response = Response::from_parts(head, body);
    let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
    let backend_addr = backend.authority();

    tokio::spawn(async move {
        let (client_io, upstream_io) =
            match tokio::try_join!(client_upgrade, upstream_upgrade) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(backend = %backend_addr, error = %e, "Upgrade handshake failed");
                    return;
                }
            };

        let mut client_io = TokioIo::new(client_io);
        let mut upstream_io = TokioIo::new(upstream_io);
        match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            Ok((to_backend, to_client)) => {
                tracing::debug!(
                    backend = %backend_addr,
                    bytes_to_backend = to_backend,
                    bytes_to_client = to_client,
                    "Upgraded connection closed"
                );
            }
            Err(e) => {
                tracing::debug!(backend = %backend_addr, error = %e, "Upgraded connection ended with error");
            }
        }
    });

    let (head, _) = upstream_response.into_parts();
    Ok(UpgradeOutcome::Switched(Response::from_parts(head, Body::empty())))
}
