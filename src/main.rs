//! fallback-router binary: wires configuration, tracing and the servers.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fallback_router::config::Config;
use fallback_router::health;
use fallback_router::proxy::{self, FallbackRouter, HttpUpstream};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let chain = Arc::new(config.chain()?);
    let options = config.router_options()?;
    let upstream = Arc::new(HttpUpstream::new().context("failed to build http client")?);

    let router = Arc::new(FallbackRouter::new(Arc::clone(&chain), upstream, options));

    tracing::info!(
        listen = %config.listen,
        primary = chain.primary().key(),
        fallbacks = chain.len() - 1,
        timeout_ms = config.timeout_ms,
        circuit_reset_secs = router.breaker().map(|b| b.reset_window().as_secs()),
        "fallback-router starting"
    );

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    tokio::select! {
        result = proxy::serve(listener, Arc::clone(&router)) => {
            result.context("edge server stopped")?;
        }
        result = health::start_health_server(config.health_listen, Arc::clone(&router)) => {
            result.context("health server stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
