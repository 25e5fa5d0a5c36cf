//! HTTP API server for the Solar Twin simulation.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for run control (start, stop) and queries (status,
//!   replay sample, live panels, history, health)
//! - **SSE endpoint** (`/api/solar/stream`) for the per-tick stream
//! - **`WebSocket` endpoint** (`/ws/stream`) carrying the same events
//!
//! # Architecture
//!
//! Every connection to a stream endpoint registers one subscriber with the
//! engine's broadcaster and unregisters it when the client goes away.
//! Both stream transports serialize the same
//! [`StreamEvent`](solar_twin_types::StreamEvent) JSON.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod sse;
pub mod startup;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
