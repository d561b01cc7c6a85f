//! Diagnostic echo backend.
//!
//! A stand-in for one backend replica. Reports its identity, the request
//! it received (method, path, URL), every header in receipt order, and
//! the perceived remote address — which makes the proxy's header
//! rewriting observable end to end.
//!
//! Run several on different ports and point the proxy's upstream list at
//! them:
//!
//! ```text
//! cargo run --bin echo-backend -- 3000
//! cargo run --bin echo-backend -- 3001
//! ```

use std::fmt::Write as _;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::routing::any;
use axum::Router;

async fn echo(ConnectInfo(addr): ConnectInfo<SocketAddr>, request: Request<Body>) -> String {
    let identity = std::env::var("HOSTNAME").unwrap_or_else(|_| "echo-backend".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "backend: {}", identity);
    let _ = writeln!(out, "method: {}", request.method());
    let _ = writeln!(out, "scheme: {}", request.uri().scheme_str().unwrap_or("http"));
    let _ = writeln!(out, "path: {}", request.uri().path());
    let _ = writeln!(out, "url: {}", request.uri());
    for (name, value) in request.headers() {
        let _ = writeln!(out, "header: {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    let _ = writeln!(out, "remote: {}", addr);
    out
}

#[tokio::main]
async fn main() {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Echo backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind echo backend");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("serve echo backend");
}
