//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (check per-IP token bucket)
//!     → headers.rs (sanitize, add X-Forwarded-*)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; forwarded headers honored only from
//!   configured trusted peers

pub mod headers;
pub mod rate_limit;

pub use headers::{is_upgrade_request, HeaderPolicy};
pub use rate_limit::RateLimiter;
