//! Simulation binary for the Nexus city.
//!
//! Wires configuration, logging, the orchestrator and the paced tick loop
//! into one process and runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `nexus-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulation from the configured seed
//! 4. Attach the bus log consumer
//! 5. Start the simulation and run the tick loop
//! 6. Stop cleanly on Ctrl-C

mod error;
mod log_callback;

use std::path::Path;

use nexus_core::config::LogFormat;
use nexus_core::{Simulation, SimulationConfig, SimulationHandle, Subscription, run_loop};
use nexus_types::{Notification, Severity};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;
use crate::log_callback::LogCallback;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "nexus-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, setup or the shutdown wait fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config);
    info!(
        grid_size = config.world.grid_size,
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        vehicles = config.fleet.normal_vehicles.saturating_add(config.fleet.emergency_vehicles),
        capacity = config.power.total_capacity,
        "Configuration loaded"
    );

    // 3. Build the simulation.
    let simulation = Simulation::new(config)?;
    let handle = SimulationHandle::new(simulation);
    info!("Simulation built");

    // 4. Attach the bus log consumer.
    let subscription = handle.subscribe().await;
    let consumer = tokio::spawn(consume_bus(subscription));

    // 5. Start and run the tick loop.
    let status = handle.start().await;
    info!(state = ?status.state, tick = status.tick, "Simulation started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = handle.clone();
    let tick_loop = tokio::spawn(async move {
        let mut callback = LogCallback::new();
        run_loop(runner, shutdown_rx, &mut callback).await
    });

    // 6. Wait for Ctrl-C, then stop.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("tick loop already gone");
    }
    let total_ticks = tick_loop.await?;

    let status = handle.stop().await;
    consumer.abort();
    info!(total_ticks, final_tick = status.tick, "nexus-engine shutdown complete");
    Ok(())
}

/// Load `nexus-config.yaml`, or defaults (plus environment overrides)
/// when the file does not exist.
fn load_config() -> Result<SimulationConfig, AppError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        Ok(SimulationConfig::parse("")?)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init(),
    }
}

/// Mirror bus notifications into the log until the bus closes.
async fn consume_bus(mut subscription: Subscription) {
    while let Some(notification) = subscription.recv().await {
        match notification {
            Notification::Event(event) => match event.severity {
                Severity::Critical => error!(
                    tick = event.tick,
                    event_type = ?event.event_type,
                    "{}",
                    event.description
                ),
                Severity::Warning => warn!(
                    tick = event.tick,
                    event_type = ?event.event_type,
                    "{}",
                    event.description
                ),
                Severity::Info => info!(
                    tick = event.tick,
                    event_type = ?event.event_type,
                    "{}",
                    event.description
                ),
            },
            Notification::Reasoning(entry) => debug!(
                tick = entry.tick,
                engine = %entry.engine,
                decision = %entry.decision,
                confidence = ?entry.confidence,
                "{}",
                entry.explanation
            ),
            Notification::Connection(status) => {
                debug!(subscribers = status.subscribers, tick = status.tick, "bus consumer attached");
            }
            Notification::StateUpdate(_) | Notification::Pong(_) => {}
        }
    }
    info!(dropped = subscription.dropped(), "bus consumer finished");
}
