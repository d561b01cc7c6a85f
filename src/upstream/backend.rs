//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Carry the rotation weight assigned at registration
//! - Precompute the base URL used when rewriting request URIs

use std::net::SocketAddr;

use url::Url;

/// A single backend server.
///
/// Immutable once registered; pool membership changes are expressed by
/// swapping in a new set of backends, never by mutating existing ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// The address of the backend.
    pub addr: SocketAddr,
    /// Pre-calculated base URL for request rewriting.
    pub base_url: Url,
    /// Rotation weight (default: 1).
    pub weight: u32,
}

impl Backend {
    /// Create a new backend with the given rotation weight.
    pub fn new(addr: SocketAddr, weight: u32) -> Self {
        // SocketAddr always formats into a parseable http URL.
        let base_url = Url::parse(&format!("http://{}", addr))
            .unwrap_or_else(|_| unreachable!("socket address is a valid URL authority"));
        Self {
            addr,
            base_url,
            weight,
        }
    }

    /// The authority (`host:port`) of this backend.
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}
