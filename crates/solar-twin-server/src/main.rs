//! Solar Twin server binary.
//!
//! Wires the replay source, simulation engine, and HTTP server together
//! and runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `solar-twin.yaml` (path overridable with
//!    `SOLAR_TWIN_CONFIG`; defaults when the file is absent)
//! 2. Initialize structured logging (tracing)
//! 3. Load the replay CSV, falling back to fleet-only on any load error
//! 4. Create the simulation engine (stopped)
//! 5. Bind and spawn the HTTP server
//! 6. Wait for `Ctrl-C`, then stop the engine and the server

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use solar_twin_core::config::LoggingConfig;
use solar_twin_core::{EngineSettings, ReplaySource, SimulationEngine, TwinConfig};
use solar_twin_observer::{AppState, ServerConfig, spawn_observer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Config file used when `SOLAR_TWIN_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "solar-twin.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the HTTP port cannot be
/// bound, or the shutdown signal cannot be installed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run().await?;
    Ok(())
}

async fn run() -> Result<(), AppError> {
    // 1. Load configuration.
    let config_path = std::env::var("SOLAR_TWIN_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = TwinConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);

    info!(
        config_path = %config_path.display(),
        host = %config.server.host,
        port = config.server.port,
        tick_interval_ms = config.simulation.tick_interval_ms,
        panels = config.fleet.panel_count,
        "solar-twin starting"
    );

    // 3. Load replay data.
    let replay = load_replay(&config.replay.path);

    // 4. Create the engine.
    let engine = SimulationEngine::new(replay, EngineSettings::from_config(&config));

    // 5. Start the HTTP server.
    let state = Arc::new(AppState::new(engine.clone()));
    let server = spawn_observer(&ServerConfig::from(&config.server), state).await?;

    // 6. Run until interrupted.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    engine.stop().await;
    server.abort();
    info!("solar-twin stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the replay CSV. A file that exists but cannot be read or decoded
/// is logged and replaced by an empty source so the engine still runs.
fn load_replay(path: &Path) -> ReplaySource {
    ReplaySource::load(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "replay load failed, running fleet-only");
        ReplaySource::empty()
    })
}
