//! Dispatch proxy library.
//!
//! A reverse proxy that spreads client HTTP requests across a pool of
//! interchangeable backend replicas.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌────────────────────────────────────────────────────────┐
//!                              │                    DISPATCH PROXY                       │
//!                              │                                                         │
//!     Client Request           │  ┌─────────┐    ┌──────────┐    ┌──────────────┐       │
//!     ─────────────────────────┼─▶│   net   │───▶│ security │───▶│   upstream   │       │
//!                              │  │listener │    │rate limit│    │ pool select  │       │
//!                              │  └─────────┘    │ headers  │    └──────┬───────┘       │
//!                              │                 └──────────┘           │               │
//!                              │                                        ▼               │
//!     Client Response          │  ┌─────────┐    ┌──────────┐    ┌──────────────┐       │
//!     ◀────────────────────────┼──│ bounded │◀───│ forward  │◀───│   backend    │◀──────┼──── Backend
//!                              │  │  relay  │    │ timeouts │    │  connection  │       │     Replica
//!                              │  └─────────┘    └──────────┘    └──────────────┘       │
//!                              │                                                         │
//!                              │  ┌───────────────────────────────────────────────────┐ │
//!                              │  │              Cross-Cutting Concerns                │ │
//!                              │  │  ┌─────────┐  ┌───────────────┐  ┌─────────────┐  │ │
//!                              │  │  │ config  │  │ observability │  │  lifecycle  │  │ │
//!                              │  │  │         │  │ access log +  │  │  shutdown   │  │ │
//!                              │  │  │         │  │   metrics     │  │  signals    │  │ │
//!                              │  │  └─────────┘  └───────────────┘  └─────────────┘  │ │
//!                              │  └───────────────────────────────────────────────────┘ │
//!                              └────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod forward;
pub mod http;
pub mod net;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
