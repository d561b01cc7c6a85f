//! Upstream pool subsystem.
//!
//! # Data Flow
//! ```text
//! Config entries (host:port)
//!     → resolve.rs (DNS or IP literal → socket addresses)
//!     → backend.rs (one Backend per resolved address)
//!     → pool.rs (ordered rotation sequence + cursor)
//!     → select() hands the dispatcher the next backend
//! ```
//!
//! # Design Decisions
//! - Strict round-robin; no health filtering and no standing failover
//! - Membership is swapped wholesale, never mutated in place
//! - Re-resolution is opt-in; the default pool is fixed at startup

pub mod backend;
pub mod pool;
pub mod resolve;

pub use backend::Backend;
pub use pool::UpstreamPool;
pub use resolve::{resolve_backends, spawn_re_resolver, ResolveError};
