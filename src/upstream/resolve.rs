//! Backend address resolution.
//!
//! # Responsibilities
//! - Turn configured `host:port` entries into concrete socket addresses
//! - Fail startup when any entry cannot be resolved or the pool is empty
//! - Optionally re-resolve on an interval and swap pool membership
//!
//! # Design Decisions
//! - IP literals bypass DNS entirely
//! - A name resolving to several addresses yields one backend per address,
//!   in resolver order, so replica sets behind one name rotate fairly
//! - Re-resolution failures keep the previous membership (serving wins)

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::sync::broadcast;

use crate::config::UpstreamConfig;
use crate::upstream::backend::Backend;
use crate::upstream::pool::UpstreamPool;
use std::sync::Arc;

/// Error type for backend resolution.
#[derive(Debug)]
pub enum ResolveError {
    /// An entry did not resolve to any address.
    Unresolvable { address: String, source: std::io::Error },
    /// An entry resolved to an empty address set.
    Empty { address: String },
    /// The configuration yields an empty pool.
    EmptyPool,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Unresolvable { address, source } => {
                write!(f, "failed to resolve backend {}: {}", address, source)
            }
            ResolveError::Empty { address } => {
                write!(f, "backend {} resolved to no addresses", address)
            }
            ResolveError::EmptyPool => write!(f, "upstream pool is empty after resolution"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolve every configured backend entry into concrete backends.
///
/// Fatal at startup: any unresolvable entry or an empty result is an error,
/// per the rule that the proxy must not silently serve nothing.
pub async fn resolve_backends(config: &UpstreamConfig) -> Result<Vec<Backend>, ResolveError> {
    let mut backends = Vec::new();

    for entry in &config.backends {
        if let Ok(addr) = entry.address.parse::<SocketAddr>() {
            backends.push(Backend::new(addr, entry.weight));
            continue;
        }

        let resolved: Vec<SocketAddr> = lookup_host(entry.address.as_str())
            .await
            .map_err(|source| ResolveError::Unresolvable {
                address: entry.address.clone(),
                source,
            })?
            .collect();

        if resolved.is_empty() {
            return Err(ResolveError::Empty {
                address: entry.address.clone(),
            });
        }

        for addr in resolved {
            backends.push(Backend::new(addr, entry.weight));
        }
    }

    if backends.is_empty() {
        return Err(ResolveError::EmptyPool);
    }

    Ok(backends)
}

/// Spawn the periodic re-resolution task, if enabled.
///
/// Swaps the pool's membership snapshot on success; keeps the previous
/// membership on failure. Returns without spawning when the interval is 0.
pub fn spawn_re_resolver(
    pool: Arc<UpstreamPool>,
    config: UpstreamConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    if config.resolve_interval_secs == 0 {
        return;
    }
    let interval = Duration::from_secs(config.resolve_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; startup already resolved.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    tracing::debug!("Re-resolver stopping");
                    return;
                }
            }

            match resolve_backends(&config).await {
                Ok(backends) => pool.replace(backends),
                Err(e) => {
                    tracing::warn!(error = %e, "Backend re-resolution failed; keeping current pool");
                }
            }
        }
    });
}
