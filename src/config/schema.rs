//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Upstream pool definition and discovery settings.
    pub upstream: UpstreamConfig,

    /// Per-client-IP rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Forwarding configuration (timeouts, buffering, keep-alive).
    pub forward: ForwardConfig,

    /// Forwarded-header rewriting policy.
    pub headers: HeaderConfig,

    /// Access log sink configuration.
    pub access_log: AccessLogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Upstream pool configuration.
///
/// Backends are listed as `host:port` entries. Hostnames are resolved at
/// startup; a name resolving to several addresses contributes one backend
/// per address, preserving list order for round-robin fairness.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend server entries, in rotation order.
    pub backends: Vec<BackendEntry>,

    /// Interval for re-resolving backend hostnames, in seconds.
    /// Zero disables re-resolution (pool membership fixed at startup).
    pub resolve_interval_secs: u64,
}

/// A single upstream backend entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendEntry {
    /// Backend address (e.g., "127.0.0.1:3000" or "backend:8000").
    pub address: String,

    /// Weight for weighted rotation (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained refill rate, tokens per second per client IP.
    pub rate_per_sec: f64,

    /// Bucket capacity (burst size) per client IP.
    pub burst: u32,

    /// Maximum number of tracked client IPs. Least-recently-seen
    /// entries are evicted when the table is full.
    pub table_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_per_sec: 5.0,
            burst: 10,
            table_capacity: 65_536,
        }
    }
}

/// Forwarding configuration for the upstream leg.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Maximum request body size in bytes. Larger bodies are rejected
    /// with 413 before any byte reaches a backend.
    pub max_body_size: usize,

    /// Allocation granularity for request body buffering, in bytes.
    pub body_buffer_chunk_size: usize,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Timeout for transmitting response data toward the client in seconds.
    pub send_timeout_secs: u64,

    /// Timeout for awaiting/reading the backend response in seconds.
    pub read_timeout_secs: u64,

    /// Idle keep-alive for reusable backend connections in seconds.
    pub keepalive_timeout_secs: u64,

    /// Number of in-flight response buffers per request.
    pub response_buffer_count: usize,

    /// Size of each response buffer in bytes.
    pub response_buffer_size: usize,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
            body_buffer_chunk_size: 128 * 1024,
            connect_timeout_secs: 90,
            send_timeout_secs: 90,
            read_timeout_secs: 90,
            keepalive_timeout_secs: 29,
            response_buffer_count: 32,
            response_buffer_size: 4096,
        }
    }
}

/// Forwarded-header rewriting policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Peers whose inbound X-Forwarded-* headers are honored.
    /// Anything else gets its forwarded headers overwritten.
    pub trusted_proxies: Vec<String>,

    /// Externally visible host name, sent to backends as Host and
    /// X-Forwarded-Host. Falls back to the inbound Host when unset.
    pub external_host_name: Option<String>,

    /// Scheme clients use to reach the proxy ("http" or "https").
    /// Sent as X-Forwarded-Proto, independent of the upstream leg.
    pub inbound_scheme: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            external_host_name: None,
            inbound_scheme: "http".to_string(),
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Log sink: "stdout" or a file path.
    pub sink: String,

    /// Entry buffer size. When the writer falls behind, entries beyond
    /// this buffer are dropped rather than delaying responses.
    pub buffer: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            sink: "stdout".to_string(),
            buffer: 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
