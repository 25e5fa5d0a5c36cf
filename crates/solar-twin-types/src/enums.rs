//! Enumeration types for the Solar Twin fleet model.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Health classification of a single simulated panel.
///
/// Re-derived every tick from the panel's fault draw and power output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum PanelStatus {
    /// Producing at or above the warning threshold.
    #[default]
    Normal,
    /// Producing, but below the warning threshold.
    Warning,
    /// Faulted this tick; output forced to zero.
    Fault,
}

impl PanelStatus {
    /// Wire name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Fault => "fault",
        }
    }
}

impl core::fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&PanelStatus::Warning).ok();
        assert_eq!(json.as_deref(), Some("\"warning\""));
        let parsed: Result<PanelStatus, _> = serde_json::from_str("\"fault\"");
        assert_eq!(parsed.ok(), Some(PanelStatus::Fault));
    }

    #[test]
    fn default_status_is_normal() {
        assert_eq!(PanelStatus::default(), PanelStatus::Normal);
        assert_eq!(PanelStatus::Normal.to_string(), "normal");
    }
}
