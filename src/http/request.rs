//! Request identification.
//!
//! # Responsibilities
//! - Ensure every request carries a unique X-Request-ID
//! - Expose the ID to handlers and echo it on responses
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A syntactically valid inbound ID is kept (callers may correlate
//!   across hops); anything else is replaced with a fresh UUID

use std::task::{Context, Poll};

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request identifier, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Extension trait for reading the request ID off a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.extensions().get::<RequestId>().map(|id| id.0.as_str())
    }
}

/// Layer that assigns request IDs.
#[derive(Debug, Clone, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Service that ensures the ID header, extension, and response echo.
#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let header_value =
            HeaderValue::from_str(&id).unwrap_or(HeaderValue::from_static("invalid"));
        request.headers_mut().insert(X_REQUEST_ID, header_value.clone());
        request.extensions_mut().insert(RequestId(id));

        let future = self.inner.call(request);
        Box::pin(async move {
            let mut response = future.await?;
            response.headers_mut().insert(X_REQUEST_ID, header_value);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn echo(request: Request<Body>) -> Result<Response<Body>, Infallible> {
        let id = request.request_id().unwrap_or("missing").to_string();
        Ok(Response::new(Body::from(id)))
    }

    #[tokio::test]
    async fn test_generates_id_when_absent() {
        let service = RequestIdLayer.layer(tower::service_fn(echo));
        let response = service
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        let id = response.headers().get(&X_REQUEST_ID).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_preserves_inbound_id() {
        let service = RequestIdLayer.layer(tower::service_fn(echo));
        let request = Request::builder()
            .header(X_REQUEST_ID, "caller-supplied-42")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(&X_REQUEST_ID).unwrap(),
            "caller-supplied-42"
        );
    }
}
