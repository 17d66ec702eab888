//! # verifynger-controller
//!
//! Headless attendance controller.
//!
//! This binary:
//! - opens the local attendance database
//! - runs the MQTT bus task that talks to the sensor node
//! - runs the controller task (enrollment, verification, metrics)
//! - reads operator commands from stdin and prints notifications

mod config;
mod console;

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use verifynger_core::{spawn_controller, Controller, CoreConfig, EventSink};
use verifynger_net::{spawn_bus, BusConfig};
use verifynger_store::Database;

use crate::config::ControllerConfig;

/// How often pending waits are checked for expiry.
const EXPIRY_TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,verifynger_core=debug")),
        )
        .init();

    info!("Starting VeriFynger controller v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and open the store
    // -----------------------------------------------------------------------
    let config = ControllerConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("failed to open attendance database")?;

    let saved = db.load_broker_settings().unwrap_or_else(|e| {
        warn!(error = %e, "Could not read saved broker settings");
        None
    });
    let broker = config.resolve_broker(saved.as_ref());
    info!(broker = %broker.host, port = broker.port, "Broker");

    // -----------------------------------------------------------------------
    // 3. Spawn the bus and the controller
    // -----------------------------------------------------------------------
    let (bus_tx, notif_rx) = spawn_bus(BusConfig {
        client_id: config.client_id.clone(),
        ..BusConfig::default()
    });

    let events = EventSink::new(256);
    let printer = tokio::spawn(console::print_events(events.subscribe()));

    let controller = Controller::new(
        db,
        bus_tx,
        events,
        CoreConfig {
            enroll_timeout: config.enroll_timeout,
            confirm_timeout: config.confirm_timeout,
        },
    );
    let (handle, task) = spawn_controller(controller, notif_rx, EXPIRY_TICK);

    if config.auto_connect {
        if let Err(e) = handle
            .connect(broker.host.clone(), broker.port.to_string())
            .await
        {
            warn!(error = %e, "Auto-connect failed");
        }
    }

    // -----------------------------------------------------------------------
    // 4. Operator console until EOF, `quit` or Ctrl-C
    // -----------------------------------------------------------------------
    tokio::select! {
        _ = console::run(handle.clone(), broker) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Err(e) = handle.disconnect().await {
        warn!(error = %e, "Disconnect on exit failed");
    }
    drop(handle);
    task.await.context("controller task panicked")?;
    printer.abort();

    info!("Controller stopped");
    Ok(())
}
