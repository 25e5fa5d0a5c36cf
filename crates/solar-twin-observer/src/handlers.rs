//! REST API endpoint handlers.
//!
//! Every handler is a thin mapping from HTTP onto a
//! [`SimulationEngine`](solar_twin_core::SimulationEngine) command.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/solar/start` | Start ticking |
//! | `POST` | `/api/solar/stop` | Stop ticking |
//! | `GET` | `/api/solar/status` | Run flag, cursor, replay size |
//! | `GET` | `/api/solar/sample` | First records of the replay |
//! | `GET` | `/api/solar/live-panels` | Current panels and fleet metrics |
//! | `GET` | `/api/solar/history` | Recent per-tick history |
//! | `GET` | `/api/health` | Liveness and data diagnostics |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use solar_twin_types::{
    EngineStatus, HistoryPoint, LivePanels, ReplaySample, StartOutcome, StopOutcome,
};
use tracing::warn;

use crate::error::ObserverError;
use crate::state::AppState;

/// Upper bound for `GET /api/solar/sample?n=`.
const MAX_SAMPLE: usize = 1000;

/// Query parameters for the `GET /api/solar/sample` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct SampleQuery {
    /// Number of records to return (default from configuration).
    pub n: Option<usize>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Start the simulation. Starting a running simulation is a no-op.
///
/// # Errors
///
/// Returns [`ObserverError::BadRequest`] when the engine requires replay
/// data and none is loaded.
pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StartOutcome>, ObserverError> {
    let outcome = state.engine.start().await.map_err(|e| {
        warn!(error = %e, "start rejected");
        ObserverError::BadRequest(e.to_string())
    })?;
    Ok(Json(outcome))
}

/// Stop the simulation. Stopping a stopped simulation is a no-op.
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<StopOutcome> {
    Json(state.engine.stop().await)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Current engine status.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}

/// The first records of the replay dataset.
///
/// # Query Parameters
///
/// - `n`: number of records, `1..=1000` (default from configuration)
///
/// # Errors
///
/// Returns [`ObserverError::InvalidQuery`] for an out-of-range `n` and
/// [`ObserverError::NotFound`] when no replay data is loaded.
pub async fn sample(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SampleQuery>,
) -> Result<Json<ReplaySample>, ObserverError> {
    let n = match query.n {
        Some(n) if n == 0 || n > MAX_SAMPLE => {
            return Err(ObserverError::InvalidQuery(format!(
                "n must be between 1 and {MAX_SAMPLE}, got {n}"
            )));
        }
        Some(n) => n,
        None => state.engine.settings().sample_size,
    };

    state
        .engine
        .sample_n(n)
        .map(Json)
        .map_err(|e| ObserverError::NotFound(e.to_string()))
}

/// Current panels and fleet metrics, outside the stream.
pub async fn live_panels(State(state): State<Arc<AppState>>) -> Json<LivePanels> {
    Json(state.engine.live_panels().await)
}

/// The bounded recent-history window, oldest first.
pub async fn history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryPoint>> {
    Json(state.engine.history().await)
}

/// Liveness probe with replay diagnostics.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let replay = state.engine.replay();
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "dataLoaded": !replay.is_empty(),
        "dataPoints": replay.len(),
        "malformedFields": replay.malformed_fields(),
        "missingColumns": replay.missing_columns(),
        "subscribers": state.engine.subscriber_count(),
        "uptimeSeconds": uptime,
    }))
}
