//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map forwarding errors to client-facing status codes
//! - Strip hop-by-hop headers from backend responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body (see forward::body)
//! - Backend timeouts result in 504 Gateway Timeout
//! - Error bodies are short plain text, never backend internals

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, CONNECTION};
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

use crate::forward::ForwardError;
use crate::observability::RequestOutcome;

/// Response-side hop-by-hop headers dropped before relaying.
const HOP_BY_HOP: [HeaderName; 4] = [
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-authenticate"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
];

/// Classify a forwarding error into status code and terminal outcome.
pub fn classify(error: &ForwardError) -> (StatusCode, RequestOutcome) {
    match error {
        ForwardError::ReadTimeout => (StatusCode::GATEWAY_TIMEOUT, RequestOutcome::TimedOut),
        ForwardError::Connect(_) => (StatusCode::BAD_GATEWAY, RequestOutcome::BackendError),
        ForwardError::Upstream(_) => (StatusCode::BAD_GATEWAY, RequestOutcome::BackendError),
        ForwardError::Request(_) => (StatusCode::BAD_GATEWAY, RequestOutcome::BackendError),
        ForwardError::BodyTooLarge => {
            (StatusCode::PAYLOAD_TOO_LARGE, RequestOutcome::BodyTooLarge)
        }
        ForwardError::BodyRead(_) => (StatusCode::BAD_REQUEST, RequestOutcome::Completed),
    }
}

/// Build a short plain-text error response.
pub fn error_response(status: StatusCode, message: &'static str) -> Response<Body> {
    (status, message).into_response()
}

/// Client-facing message for an error status.
pub fn status_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::GATEWAY_TIMEOUT => "Backend timed out",
        StatusCode::BAD_GATEWAY => "Upstream request failed",
        StatusCode::PAYLOAD_TOO_LARGE => "Request body too large",
        StatusCode::SERVICE_UNAVAILABLE => "No backends available",
        StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded",
        StatusCode::BAD_REQUEST => "Malformed request",
        _ => "Request failed",
    }
}

/// Remove hop-by-hop headers from a backend response.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
