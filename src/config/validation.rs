//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream pool is non-empty and addresses are well-formed
//! - Validate value ranges (timeouts > 0, buffer sizes > 0)
//! - Check the trusted-proxy list parses as IP addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::ProxyConfig;

/// A single validation failure, pointing at the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the field (e.g., "upstream.backends").
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a loaded configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(err(
            "listener.bind_address",
            format!("not a valid socket address: {}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(err("listener.max_connections", "must be greater than zero"));
    }

    if config.upstream.backends.is_empty() {
        errors.push(err(
            "upstream.backends",
            "at least one backend is required; refusing to serve an empty pool",
        ));
    }
    for (i, backend) in config.upstream.backends.iter().enumerate() {
        let field = format!("upstream.backends[{}]", i);
        match backend.address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                if port.parse::<u16>().is_err() {
                    errors.push(err(&field, format!("invalid port in address: {}", backend.address)));
                }
            }
            _ => {
                errors.push(err(&field, format!("address must be host:port, got: {}", backend.address)));
            }
        }
        if backend.weight == 0 {
            errors.push(err(&field, "weight must be at least 1"));
        }
    }

    if config.rate_limit.enabled {
        if !(config.rate_limit.rate_per_sec > 0.0) {
            errors.push(err("rate_limit.rate_per_sec", "must be greater than zero"));
        }
        if config.rate_limit.burst == 0 {
            errors.push(err("rate_limit.burst", "must be at least 1"));
        }
        if config.rate_limit.table_capacity == 0 {
            errors.push(err("rate_limit.table_capacity", "must be greater than zero"));
        }
    }

    if config.forward.max_body_size == 0 {
        errors.push(err("forward.max_body_size", "must be greater than zero"));
    }
    if config.forward.body_buffer_chunk_size == 0 {
        errors.push(err("forward.body_buffer_chunk_size", "must be greater than zero"));
    }
    for (field, value) in [
        ("forward.connect_timeout_secs", config.forward.connect_timeout_secs),
        ("forward.send_timeout_secs", config.forward.send_timeout_secs),
        ("forward.read_timeout_secs", config.forward.read_timeout_secs),
    ] {
        if value == 0 {
            errors.push(err(field, "must be greater than zero"));
        }
    }
    if config.forward.response_buffer_count == 0 {
        errors.push(err("forward.response_buffer_count", "must be greater than zero"));
    }
    if config.forward.response_buffer_size == 0 {
        errors.push(err("forward.response_buffer_size", "must be greater than zero"));
    }

    for (i, peer) in config.headers.trusted_proxies.iter().enumerate() {
        if peer.parse::<IpAddr>().is_err() {
            errors.push(err(
                &format!("headers.trusted_proxies[{}]", i),
                format!("not a valid IP address: {}", peer),
            ));
        }
    }
    match config.headers.inbound_scheme.as_str() {
        "http" | "https" => {}
        other => {
            errors.push(err(
                "headers.inbound_scheme",
                format!("must be \"http\" or \"https\", got: {}", other),
            ));
        }
    }

    if config.access_log.buffer == 0 {
        errors.push(err("access_log.buffer", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(err(
            "observability.metrics_address",
            format!("not a valid socket address: {}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
