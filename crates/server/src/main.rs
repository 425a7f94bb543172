//! Token aggregator
//!
//! Main entry point: loads configuration, starts the background refresh and
//! update tasks, and runs until a shutdown signal arrives.

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tokenagg_core::ServiceConfig;
use tokenagg_server::TokenService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting token aggregator v{}", env!("CARGO_PKG_VERSION"));

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Chain {} | cache {} (ttl {}s) | refresh every {}s | updates every {}ms",
        config.sources.chain,
        if config.cache.enabled { "on" } else { "off" },
        config.cache.ttl_secs,
        config.refresh_interval_secs,
        config.feed.update_interval_ms
    );

    let service = TokenService::from_config(config).await?;
    service.start();

    info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    service.stop().await;
    let health = service.health();
    info!(
        "Shutdown complete: {} tokens cached, {} listeners, up {}s",
        health.cached_tokens, health.listeners, health.uptime_secs
    );

    Ok(())
}

/// `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}
