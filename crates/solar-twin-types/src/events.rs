//! Stream event taxonomy delivered to subscribers.
//!
//! Every event is serialized as a flat JSON object discriminated by a
//! `type` tag. A subscriber sees them in this order of first occurrence:
//!
//! | `type` | When |
//! |--------|------|
//! | `connected` | Once, on registration |
//! | `combined` | Every tick while replay data exists |
//! | `panels` | Every tick while no replay data exists |
//! | `stopped` | Once per transition to stopped |
//!
//! `combined` frames merge the replayed record with live fleet state.
//! Generated fields win on name collisions: the record's own timestamp is
//! carried as `recordedAt` so `timestamp` always means "when this tick ran".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::structs::{FleetMetrics, Panel, Readings};

/// A single message on the subscriber stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum StreamEvent {
    /// Initial status, delivered on registration.
    Connected(ConnectedEvent),
    /// Replay record merged with fleet state.
    Combined(CombinedFrame),
    /// Fleet state only (no replay data loaded).
    Panels(PanelsFrame),
    /// The engine transitioned to stopped.
    Stopped(StoppedEvent),
}

impl StreamEvent {
    /// The wire tag of this event.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Combined(_) => "combined",
            Self::Panels(_) => "panels",
            Self::Stopped(_) => "stopped",
        }
    }

    /// Whether this event is a per-tick snapshot.
    pub const fn is_frame(&self) -> bool {
        matches!(self, Self::Combined(_) | Self::Panels(_))
    }
}

/// Payload of a `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ConnectedEvent {
    /// Human-readable greeting.
    pub message: String,
    /// Number of records in the replay source.
    pub total_data_points: u64,
    /// Whether the engine is ticking at registration time.
    pub is_running: bool,
}

/// Payload of a `combined` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CombinedFrame {
    /// Replay record sequence index.
    pub id: u64,
    /// Timestamp recorded in the replay source.
    pub recorded_at: String,
    /// Replayed readings, flattened under their column names.
    #[serde(flatten)]
    pub readings: Readings,
    /// 1-based position of this record in the replay (wraps on loop).
    pub current_index: u64,
    /// Length of the replay.
    pub total_points: u64,
    /// Tick number since the engine was created (1-based, never wraps).
    pub tick: u64,
    /// When this tick ran.
    pub timestamp: DateTime<Utc>,
    /// Full panel list after the tick.
    pub panels: Vec<Panel>,
    /// Fleet aggregate after the tick.
    pub metrics: FleetMetrics,
}

/// Payload of a `panels` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PanelsFrame {
    /// Tick number since the engine was created (1-based).
    pub tick: u64,
    /// When this tick ran.
    pub timestamp: DateTime<Utc>,
    /// Full panel list after the tick.
    pub panels: Vec<Panel>,
    /// Fleet aggregate after the tick.
    pub metrics: FleetMetrics,
}

/// Payload of a `stopped` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StoppedEvent {
    /// Human-readable summary.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::PanelCount;

    fn combined() -> StreamEvent {
        StreamEvent::Combined(CombinedFrame {
            id: 2,
            recorded_at: String::from("2024-06-01 12:00:01"),
            readings: Readings {
                active_power: 3.25,
                ..Readings::default()
            },
            current_index: 2,
            total_points: 3,
            tick: 5,
            timestamp: Utc::now(),
            panels: Vec::new(),
            metrics: FleetMetrics {
                panel_count: PanelCount::default(),
                ..FleetMetrics::default()
            },
        })
    }

    #[test]
    fn combined_frame_is_a_flat_tagged_object() {
        let value = serde_json::to_value(combined()).unwrap_or_default();
        assert_eq!(value["type"], "combined");
        assert_eq!(value["currentIndex"], 2);
        assert_eq!(value["totalPoints"], 3);
        assert_eq!(value["ActivePowerL3"], 3.25);
        assert_eq!(value["recordedAt"], "2024-06-01 12:00:01");
        assert!(value["panels"].is_array());
        assert!(value["metrics"]["panelCount"].is_object());
    }

    #[test]
    fn connected_event_carries_dashboard_fields() {
        let event = StreamEvent::Connected(ConnectedEvent {
            message: String::from("hello"),
            total_data_points: 3,
            is_running: false,
        });
        let value = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["totalDataPoints"], 3);
        assert_eq!(value["isRunning"], false);
        assert_eq!(event.kind(), "connected");
        assert!(!event.is_frame());
    }

    #[test]
    fn tagged_events_parse_back() {
        let json = r#"{"type":"stopped","message":"Simulation stopped"}"#;
        let parsed: Result<StreamEvent, _> = serde_json::from_str(json);
        assert!(matches!(parsed, Ok(StreamEvent::Stopped(_))));

        let frame = combined();
        let text = serde_json::to_string(&frame).unwrap_or_default();
        let back: Result<StreamEvent, _> = serde_json::from_str(&text);
        assert!(back.is_ok_and(|event| event.is_frame() && event.kind() == "combined"));
    }
}
