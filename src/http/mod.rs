//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept, dispatch state machine)
//!     → request.rs (request ID assignment)
//!     → [security rewrites forwarded headers]
//!     → [forward sends to the selected backend]
//!     → response.rs (strip hop-by-hop, map errors)
//!     → upgrade.rs (protocol-switch pass-through)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
