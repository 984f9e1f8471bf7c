use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drone_stream_monitor::{
    config::Config,
    database::Database,
    relay::MediaRelayClient,
    services::{FleetCoordinator, Stores},
};

#[derive(Parser)]
#[command(name = "drone-stream-monitor")]
#[command(version)]
#[command(about = "Drone video path monitor with encoder supervision and simulated telemetry")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Media relay control API URL (overrides config file)
    #[arg(short = 'r', long, value_name = "URL")]
    relay_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("drone_stream_monitor={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting drone stream monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(relay_url) = cli.relay_url {
        config.relay.api_url = relay_url;
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let relay = Arc::new(MediaRelayClient::new(&config.relay)?);
    info!("Media relay API at {}", config.relay.api_url);

    let coordinator = Arc::new(FleetCoordinator::new(
        config,
        relay,
        Some(Stores::sqlite(&database)),
    ));

    if !coordinator.encoders().check_availability().await {
        warn!("Encoder binary is not available; file, camera and screen sources will fail to start");
    }

    let health = coordinator.health().await;
    if !health.relay_healthy {
        warn!(
            "Media relay is not reachable yet: {}",
            health.relay_detail.as_deref().unwrap_or("unknown error")
        );
    }

    match coordinator.restore_from_store().await {
        Ok(count) => info!("{} drones restored", count),
        Err(e) => error!("Failed to restore drones: {}", e),
    }

    coordinator.start().await;

    shutdown_signal().await;
    info!("Shutdown signal received");

    coordinator.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
