// SPDX-License-Identifier: MIT

//! Standalone conductor process. Wires an in-memory node store and the fake
//! hardware driver into a [`ConductorService`] and runs it until the process
//! receives `SIGTERM`/`SIGINT`. There is no socket or REST layer here: the
//! RPC surface ([`conductor_service::ConductorApi`]) is a library API meant
//! to be embedded by whatever transport a deployment wants, not a binary
//! concern of this crate.

use std::sync::Arc;

use conductor_core::{Settings, SystemClock};
use conductor_driver::{fake_driver, DriverRegistry};
use conductor_service::ConductorService;
use conductor_store::memory::InMemoryNodeStore;
use conductor_store::NodeStore;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let settings = load_settings();

    let registry = Arc::new(DriverRegistry::new());
    for hardware_type in &settings.hardware_types {
        if let Err(e) = registry.register(fake_driver(hardware_type.as_str())) {
            tracing::warn!(error = %e, hardware_type, "could not register driver");
        }
    }

    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());

    let service = match ConductorService::start(settings, store, registry, SystemClock::new()).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "conductor failed to start");
            std::process::exit(1);
        }
    };

    tracing::info!(host = %service.ctx.host, "conductor started");
    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");
    service.shutdown().await;
}

/// Loads settings from the file named by `CONDUCTOR_SETTINGS_PATH`, or falls
/// back to defaults (an in-memory single-node demo) if unset.
fn load_settings() -> Settings {
    let Ok(path) = std::env::var("CONDUCTOR_SETTINGS_PATH") else {
        return Settings::default();
    };
    match std::fs::read_to_string(&path).map(|raw| Settings::from_toml(&raw)) {
        Ok(Ok(settings)) => settings,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, path, "invalid settings file, falling back to defaults");
            Settings::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, path, "could not read settings file, falling back to defaults");
            Settings::default()
        }
    }
}

async fn wait_for_shutdown_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not install SIGTERM handler, watching ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
