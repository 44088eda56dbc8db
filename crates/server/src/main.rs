mod bootstrap;
mod health;
pub mod webhook;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dealbridge_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use dealbridge_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(&app.config.server.bind_address, app.config.server.health_check_port).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "dealbridge-server started"
    );

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let signal = {
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.notified().await }
    };
    let server = tokio::spawn(
        axum::serve(listener, webhook::router(app.state)).with_graceful_shutdown(signal).into_future(),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "dealbridge-server stopping"
    );
    shutdown.notify_one();

    let drain_cap = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(drain_cap, server).await {
        Ok(joined) => {
            joined??;
        }
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                drain_cap_secs = app.config.server.graceful_shutdown_secs,
                "open connections did not drain in time, exiting anyway"
            );
        }
    }

    Ok(())
}
