//! Core data structs for the Solar Twin broadcaster.
//!
//! Field names follow the dashboard's wire format: `camelCase` for
//! generated fields, and the inverter export's own column names for the
//! replayed readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::PanelStatus;

// ---------------------------------------------------------------------------
// Replay data
// ---------------------------------------------------------------------------

/// The fixed set of numeric readings carried by one replay record.
///
/// Serialized under the column names of the inverter export so a replayed
/// record looks the same on the wire as the row it came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Readings {
    /// Active power on phase L3.
    #[serde(rename = "ActivePowerL3")]
    pub active_power: f64,
    /// Current on phase L3.
    #[serde(rename = "CurrentL3")]
    pub current: f64,
    /// Voltage on phase L3.
    #[serde(rename = "VoltageL3")]
    pub voltage: f64,
    /// Solar irradiation.
    #[serde(rename = "IRRADIATION")]
    pub irradiation: f64,
    /// Ambient temperature.
    #[serde(rename = "temp")]
    pub temperature: f64,
}

impl Readings {
    /// Column names of the numeric readings, in declaration order.
    pub const COLUMNS: [&'static str; 5] =
        ["ActivePowerL3", "CurrentL3", "VoltageL3", "IRRADIATION", "temp"];
}

/// One immutable, pre-recorded row of the replay dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReplayRecord {
    /// 1-based sequence index assigned at load time.
    pub id: u64,
    /// Timestamp as recorded in the source.
    pub timestamp: String,
    /// Numeric readings.
    #[serde(flatten)]
    pub readings: Readings,
}

/// Diagnostic sample of the replay dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ReplaySample {
    /// The first records of the dataset.
    pub sample_data: Vec<ReplayRecord>,
    /// Total number of records loaded.
    pub total_points: u64,
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// A simulated solar panel.
///
/// Owned by the fleet model and mutated once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Panel {
    /// Stable identifier (`P01`, `P02`, ...).
    pub id: String,
    /// Instantaneous output in watts.
    pub power: f64,
    /// Terminal voltage in volts.
    pub voltage: f64,
    /// Output current in amperes.
    pub current: f64,
    /// Cell temperature in degrees Celsius.
    pub temperature: f64,
    /// Health classification.
    pub status: PanelStatus,
    /// When the readings were last updated.
    pub last_update: DateTime<Utc>,
}

/// Panel counts per health status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PanelCount {
    /// Number of panels in the fleet.
    pub total: u32,
    /// Panels in [`PanelStatus::Normal`].
    pub normal: u32,
    /// Panels in [`PanelStatus::Warning`].
    pub warning: u32,
    /// Panels in [`PanelStatus::Fault`].
    pub fault: u32,
}

/// Fleet-wide aggregate, recomputed from the current panel set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct FleetMetrics {
    /// Sum of panel power.
    pub total_power: f64,
    /// Mean panel voltage.
    pub avg_voltage: f64,
    /// Mean panel current.
    pub avg_current: f64,
    /// Mean panel temperature.
    pub avg_temperature: f64,
    /// Counts per health status.
    pub panel_count: PanelCount,
}

/// Point-in-time view of the fleet, served outside the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LivePanels {
    /// All panels.
    pub panels: Vec<Panel>,
    /// Aggregate over `panels`.
    pub metrics: FleetMetrics,
    /// When the view was taken.
    pub timestamp: DateTime<Utc>,
}

/// One entry in the engine's bounded recent-history window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct HistoryPoint {
    /// Tick number since the engine was created (1-based).
    pub tick: u64,
    /// 1-based replay position, absent for fleet-only ticks.
    pub current_index: Option<u64>,
    /// Replayed active power, absent for fleet-only ticks.
    pub active_power: Option<f64>,
    /// Fleet total power after the tick.
    pub total_power: f64,
    /// When the tick ran.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine command results
// ---------------------------------------------------------------------------

/// Consistent read of the simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct EngineStatus {
    /// Whether the engine is ticking.
    #[serde(rename = "isRunning")]
    pub running: bool,
    /// Position of the next replay record to emit (0-based).
    #[serde(rename = "currentIndex")]
    pub cursor: u64,
    /// Number of records in the replay source.
    #[serde(rename = "totalDataPoints")]
    pub total_records: u64,
    /// Whether any replay data is loaded.
    pub has_data: bool,
}

/// Result of a start command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StartOutcome {
    /// `false` when the engine was already running and nothing changed.
    pub accepted: bool,
    /// Running flag after the command.
    #[serde(rename = "isRunning")]
    pub running: bool,
    /// Human-readable summary.
    pub message: String,
}

/// Result of a stop command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StopOutcome {
    /// Running flag after the command.
    #[serde(rename = "isRunning")]
    pub running: bool,
    /// Human-readable summary.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_record_flattens_readings_under_column_names() {
        let record = ReplayRecord {
            id: 1,
            timestamp: String::from("2024-06-01 12:00:00"),
            readings: Readings {
                active_power: 1.5,
                current: 2.0,
                voltage: 230.0,
                irradiation: 800.0,
                temperature: 25.0,
            },
        };
        let value = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(value["id"], 1);
        assert_eq!(value["ActivePowerL3"], 1.5);
        assert_eq!(value["IRRADIATION"], 800.0);
        assert_eq!(value["temp"], 25.0);
        assert!(value.get("readings").is_none());
    }

    #[test]
    fn engine_status_uses_dashboard_field_names() {
        let status = EngineStatus {
            running: true,
            cursor: 2,
            total_records: 3,
            has_data: true,
        };
        let value = serde_json::to_value(status).unwrap_or_default();
        assert_eq!(value["isRunning"], true);
        assert_eq!(value["currentIndex"], 2);
        assert_eq!(value["totalDataPoints"], 3);
        assert_eq!(value["hasData"], true);
    }
}
