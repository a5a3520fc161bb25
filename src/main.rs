mod api_server;
mod bridge;
mod config;
mod device;
mod endpoints;
mod error;
mod gateway;
mod hub;
mod mapper;
mod notifications;
mod resolver;
mod session;
mod supervisor;
mod wire;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bridge::Bridge;
use crate::config::Config;
use crate::hub::{AccessoryHub, InMemoryHub};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,beoplay_homekit_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Beoplay-HomeKit Bridge");

    let config = Config::load_from_env().context("Failed to load bridge configuration")?;
    info!(
        "Configuration loaded: {} ({} devices)",
        config.bridge.name,
        config.devices.len()
    );

    let hub = Arc::new(InMemoryHub::new());
    let store = hub.store();
    let hub_dyn: Arc<dyn AccessoryHub> = hub.clone();
    let bridge = Arc::new(Bridge::start(hub_dyn, &config.devices).await);

    info!("Devices:");
    for status in bridge.statuses() {
        info!("  - {} ({}) - Type: {}", status.name, status.id, status.kind);
    }

    let api_bridge = bridge.clone();
    let api_port = config.bridge.port;
    tokio::spawn(async move {
        if let Err(e) = api_server::start_api_server(api_bridge, store, api_port).await {
            error!("API server failed: {}", e);
        }
    });

    info!("");
    info!("✅ Beoplay-HomeKit Bridge is running!");
    info!("   - Devices: {}", bridge.len());
    info!("   - HTTP API: http://localhost:{}", api_port);
    info!("");
    info!("Press Ctrl+C to exit.");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    bridge.shutdown();

    Ok(())
}
