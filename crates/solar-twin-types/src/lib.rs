//! Shared type definitions for the Solar Twin telemetry broadcaster.
//!
//! This crate is the single source of truth for every payload that crosses
//! a crate boundary or goes out over the wire. Types defined here flow
//! downstream to `TypeScript` via `ts-rs` for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers
//! - [`enums`] -- Panel health status
//! - [`structs`] -- Replay records, panels, fleet metrics, engine status
//! - [`events`] -- The tagged stream event taxonomy delivered to subscribers

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::PanelStatus;
pub use events::{CombinedFrame, ConnectedEvent, PanelsFrame, StoppedEvent, StreamEvent};
pub use ids::SubscriberId;
pub use structs::{
    EngineStatus, FleetMetrics, HistoryPoint, LivePanels, Panel, PanelCount, Readings,
    ReplayRecord, ReplaySample, StartOutcome, StopOutcome,
};
