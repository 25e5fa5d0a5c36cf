//! Shared application state for the HTTP server.

use chrono::{DateTime, Utc};
use solar_twin_core::SimulationEngine;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor. Every handler goes through the engine handle; the server
/// holds no simulation state of its own.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The simulation engine.
    pub engine: SimulationEngine,
    /// When the server state was created, reported by the health check.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap an engine handle.
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}
