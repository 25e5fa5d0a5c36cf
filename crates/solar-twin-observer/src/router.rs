//! Axum router construction.
//!
//! Assembles all routes (REST, SSE and `WebSocket`) into a single
//! [`Router`] with CORS middleware enabled for cross-origin dashboard
//! access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, sse, ws};

/// Build the complete Axum router.
///
/// The router includes:
/// - `POST /api/solar/start` and `POST /api/solar/stop` -- run control
/// - `GET /api/solar/status` -- engine status
/// - `GET /api/solar/sample` -- replay sample
/// - `GET /api/solar/live-panels` -- current fleet
/// - `GET /api/solar/history` -- recent history
/// - `GET /api/solar/stream` -- SSE event stream
/// - `GET /ws/stream` -- `WebSocket` event stream
/// - `GET /api/health` -- liveness probe
///
/// CORS allows any origin so a dashboard served elsewhere can connect.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Run control
        .route("/api/solar/start", post(handlers::start))
        .route("/api/solar/stop", post(handlers::stop))
        // Queries
        .route("/api/solar/status", get(handlers::status))
        .route("/api/solar/sample", get(handlers::sample))
        .route("/api/solar/live-panels", get(handlers::live_panels))
        .route("/api/solar/history", get(handlers::history))
        .route("/api/health", get(handlers::health))
        // Streams
        .route("/api/solar/stream", get(sse::sse_stream))
        .route("/ws/stream", get(ws::ws_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
