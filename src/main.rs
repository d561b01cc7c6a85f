//! Dispatch proxy entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use dispatch_proxy::config::loader::load_config;
use dispatch_proxy::http::HttpServer;
use dispatch_proxy::lifecycle::{spawn_signal_listener, Shutdown};
use dispatch_proxy::net::Listener;
use dispatch_proxy::observability::{logging, metrics, AccessLogger};
use dispatch_proxy::upstream::{resolve_backends, spawn_re_resolver, UpstreamPool};

#[derive(Parser)]
#[command(name = "dispatch-proxy")]
#[command(about = "Round-robin dispatch proxy for interchangeable backend replicas", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Configuration errors are fatal before anything starts serving.
    let config = load_config(&cli.config)?;

    if cli.validate {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        backends = config.upstream.backends.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    // An unresolvable or empty pool is a startup error; the proxy must
    // not silently serve nothing.
    let backends = resolve_backends(&config.upstream).await?;
    tracing::info!(backends = backends.len(), "Upstream pool resolved");
    let pool = Arc::new(UpstreamPool::new(backends));

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    spawn_re_resolver(pool.clone(), config.upstream.clone(), shutdown.subscribe());

    let access_log = AccessLogger::spawn(&config.access_log);
    let listener = Listener::bind(&config.listener).await?;

    let server = HttpServer::new(config, pool, access_log);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
