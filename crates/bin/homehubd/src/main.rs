//! # homehubd — homehub daemon
//!
//! Composition root that wires all adapters together and runs the hub.
//!
//! ## Responsibilities
//! - Load configuration (`homehub.toml` plus `HOMEHUB_*` env overrides)
//! - Initialize `tracing` with an `EnvFilter`
//! - Register the enabled protocol driver factories
//! - Drive the daemon lifecycle: `initialize` → `start` → `stop`
//! - Build the axum router over the daemon, bind to a TCP port and serve
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It only wires things together; no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use homehub_adapter_esphome::EsphomeFactory;
use homehub_adapter_http_axum::router;
use homehub_adapter_http_axum::state::AppState;
use homehub_adapter_matter::MatterFactory;
use homehub_adapter_storage_sqlite_sqlx::SqliteDeviceStore;
use homehub_adapter_virtual::VirtualFactory;
use homehub_app::daemon::HubDaemon;
use homehub_app::driver_registry::DriverRegistry;

use crate::config::{Config, DriversConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    let daemon = Arc::new(HubDaemon::<SqliteDeviceStore>::new(driver_registry(
        &config.drivers,
    )));

    if let Err(err) = daemon.initialize(config.daemon_config()).await {
        if let Err(stop) = daemon.stop().await {
            tracing::warn!(error = %stop, "daemon did not stop cleanly after failed initialization");
        }
        return Err(err).context("failed to initialize hub daemon");
    }
    daemon.start().await.context("failed to start hub daemon")?;

    let served = serve(&config, Arc::clone(&daemon)).await;
    let stopped = daemon.stop().await.context("failed to stop hub daemon");
    served?;
    stopped?;
    tracing::info!("homehubd stopped");
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?} ({err}), falling back to \"info\"");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn driver_registry(drivers: &DriversConfig) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    if drivers.esphome.enabled {
        registry.register(Arc::new(EsphomeFactory::new(
            drivers.esphome.settings.clone(),
        )));
    }
    if drivers.matter.enabled {
        registry.register(Arc::new(MatterFactory::default()));
    }
    if drivers.virtual_devices.enabled {
        registry.register(Arc::new(VirtualFactory::new()));
    }
    if registry.is_empty() {
        tracing::warn!("no protocol driver enabled, pairing will be refused");
    }
    registry
}

async fn serve(config: &Config, daemon: Arc<HubDaemon<SqliteDeviceStore>>) -> anyhow::Result<()> {
    let app = router::build(AppState::new(daemon));
    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, "homehubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
