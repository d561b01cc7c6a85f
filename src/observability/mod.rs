//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured diagnostic events)
//!     → access_log.rs (one record per request outcome)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Access logging is best-effort: a dead or slow sink sheds entries,
//!   it never delays a response
//! - Metrics are cheap (atomic increments)
//! - Request ID flows through all subsystems

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessLogEntry, AccessLogger, RequestOutcome};
