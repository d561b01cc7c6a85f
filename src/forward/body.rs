//! Request body buffering and response relaying.
//!
//! # Responsibilities
//! - Buffer request bodies up to the configured maximum, growing in
//!   fixed-size chunks
//! - Relay response bodies through a bounded set of fixed-size buffers
//! - Finalize and emit the access log entry when a relay completes
//!
//! # Design Decisions
//! - Oversized bodies are rejected before any byte reaches a backend
//! - Responses are never materialized: memory per request is bounded by
//!   response_buffer_count × response_buffer_size
//! - A disconnected client aborts the relay, dropping the upstream body
//!   and releasing its buffers

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::config::ForwardConfig;
use crate::forward::ForwardError;
use crate::observability::access_log::{now_ms, AccessLogEntry, AccessLogger, RequestOutcome};

/// Read and buffer an inbound request body.
///
/// A declared Content-Length above the limit is rejected without reading
/// a single byte. Otherwise the body is drained chunk by chunk and the
/// buffer grows in `body_buffer_chunk_size` increments until `max_body_size`
/// would be exceeded.
pub async fn buffer_request_body(
    body: Body,
    content_length: Option<u64>,
    config: &ForwardConfig,
) -> Result<Bytes, ForwardError> {
    let max = config.max_body_size;
    if let Some(declared) = content_length {
        if declared > max as u64 {
            return Err(ForwardError::BodyTooLarge);
        }
    }

    let chunk = config.body_buffer_chunk_size.max(1);
    let mut buf = bytes::BytesMut::new();
    let mut stream = body.into_data_stream();

    while let Some(piece) = stream.next().await {
        let piece = piece.map_err(ForwardError::BodyRead)?;
        if buf.len() + piece.len() > max {
            return Err(ForwardError::BodyTooLarge);
        }
        if buf.len() + piece.len() > buf.capacity() {
            let shortfall = buf.len() + piece.len() - buf.capacity();
            buf.reserve(shortfall.div_ceil(chunk) * chunk);
        }
        buf.extend_from_slice(&piece);
    }

    Ok(buf.freeze())
}

/// Timing context carried into a response relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayTimings {
    /// When the proxy received the request.
    pub received_at: Instant,
    /// When the request was dispatched upstream.
    pub dispatched_at: Instant,
}

/// Relay an upstream response body to the client with bounded buffering.
///
/// Returns the client-facing body immediately; a task pumps data from the
/// upstream through a channel of `response_buffer_count` buffers, each at
/// most `response_buffer_size` bytes. The access log entry is finalized
/// (byte count, timings, outcome) and emitted exactly once when the relay
/// reaches a terminal state.
pub fn relay_response_body(
    upstream: Body,
    config: &ForwardConfig,
    logger: AccessLogger,
    mut entry: AccessLogEntry,
    timings: RelayTimings,
) -> Body {
    let buffer_size = config.response_buffer_size.max(1);
    let read_timeout = Duration::from_secs(config.read_timeout_secs);
    let send_timeout = Duration::from_secs(config.send_timeout_secs);
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(config.response_buffer_count.max(1));

    tokio::spawn(async move {
        let mut stream = upstream.into_data_stream();
        let mut sent: u64 = 0;

        'relay: loop {
            let piece = match tokio::time::timeout(read_timeout, stream.next()).await {
                Err(_) => {
                    // Backend stalled mid-body after the head went out.
                    tracing::warn!("Backend response body read timed out");
                    entry.outcome = RequestOutcome::TimedOut;
                    let _ = tx.try_send(Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "backend response timed out",
                    )));
                    break 'relay;
                }
                Ok(None) => break 'relay,
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Backend response body read failed");
                    entry.outcome = RequestOutcome::BackendError;
                    let _ = tx.try_send(Err(std::io::Error::other(e)));
                    break 'relay;
                }
                Ok(Some(Ok(piece))) => piece,
            };

            let mut piece = piece;
            while !piece.is_empty() {
                let buffer = piece.split_to(piece.len().min(buffer_size));
                let len = buffer.len() as u64;
                match tokio::time::timeout(send_timeout, tx.send(Ok(buffer))).await {
                    Ok(Ok(())) => sent += len,
                    // Client disconnected or stalled beyond the send
                    // timeout; drop the upstream body to cancel it.
                    _ => break 'relay,
                }
            }
        }

        entry.timestamp_ms = now_ms();
        entry.body_bytes_sent = sent;
        entry.request_time_ms = timings.received_at.elapsed().as_secs_f64() * 1000.0;
        entry.upstream_response_time_ms =
            Some(timings.dispatched_at.elapsed().as_secs_f64() * 1000.0);
        logger.emit(entry);
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Body::from_stream(stream)
}
