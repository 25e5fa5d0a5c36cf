//! Configuration loading and typed config structures for Solar Twin.
//!
//! The configuration lives in a YAML file (`solar-twin.yaml` by default).
//! Every section and field has a default, so an empty file, or no file at
//! all, yields a runnable configuration.
//!
//! A handful of deployment settings can be overridden from the environment
//! after the file is read:
//!
//! - `HOST` overrides `server.host`
//! - `PORT` overrides `server.port`
//! - `REPLAY_PATH` overrides `replay.path`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TwinConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Replay dataset settings.
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Tick cadence and engine behavior.
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Simulated fleet parameters.
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Subscriber fan-out settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TwinConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults. Either
    /// way environment overrides are applied and the result validated.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file) when the file exists;
    /// [`ConfigError::Invalid`] otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `HOST`, `PORT` and `REPLAY_PATH` from the environment.
    ///
    /// Unparseable `PORT` values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid PORT"),
            }
        }
        if let Ok(val) = std::env::var("REPLAY_PATH") {
            self.replay.path = PathBuf::from(val);
        }
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_interval_ms == 0 {
            return Err(invalid("simulation.tick_interval_ms", "must be greater than zero"));
        }
        if self.simulation.history_window > MAX_HISTORY_WINDOW {
            return Err(invalid(
                "simulation.history_window",
                &format!("must be at most {MAX_HISTORY_WINDOW}"),
            ));
        }
        if self.broadcast.channel_capacity == 0
            || self.broadcast.channel_capacity > MAX_CHANNEL_CAPACITY
        {
            return Err(invalid(
                "broadcast.channel_capacity",
                &format!("must be within [1, {MAX_CHANNEL_CAPACITY}]"),
            ));
        }
        if !(0.0..=1.0).contains(&self.fleet.fault_probability) {
            return Err(invalid("fleet.fault_probability", "must be within [0, 1]"));
        }
        // The per-tick delta is drawn from [-step, step), whose width must
        // stay finite.
        let step = self.fleet.power_step;
        if !step.is_finite() || step < 0.0 || !(step * 2.0).is_finite() {
            return Err(invalid("fleet.power_step", "must be finite and non-negative"));
        }
        if !self.fleet.power_max.is_finite() || self.fleet.power_max <= 0.0 {
            return Err(invalid("fleet.power_max", "must be finite and positive"));
        }
        if !self.fleet.warning_threshold.is_finite() {
            return Err(invalid("fleet.warning_threshold", "must be finite"));
        }
        self.fleet.voltage.check("fleet.voltage")?;
        self.fleet.current.check("fleet.current")?;
        self.fleet.temperature.check("fleet.temperature")?;
        if self.fleet.voltage.min <= 0.0 {
            return Err(invalid("fleet.voltage", "lower bound must be positive"));
        }
        Ok(())
    }
}

/// Largest accepted `simulation.history_window` (one day of 1 s ticks).
pub const MAX_HISTORY_WINDOW: usize = 86_400;

/// Largest accepted `broadcast.channel_capacity`.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Replay dataset settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplayConfig {
    /// CSV file to replay. A missing file means fleet-only operation.
    #[serde(default = "default_replay_path")]
    pub path: PathBuf,

    /// Number of records returned by the sample command.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Refuse to start when no replay data is loaded.
    #[serde(default)]
    pub require_data: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: default_replay_path(),
            sample_size: default_sample_size(),
            require_data: false,
        }
    }
}

/// Tick cadence and engine behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationSettings {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of recent ticks kept for the history endpoint.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Seed for the fleet's random source. Unseeded runs draw from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationSettings {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            history_window: default_history_window(),
            seed: None,
        }
    }
}

/// An inclusive-exclusive range `[min, max)` that readings are sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Band {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (exclusive).
    pub max: f64,
}

impl Band {
    /// Construct a band.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn check(self, field: &'static str) -> Result<(), ConfigError> {
        if self.min < self.max && (self.max - self.min).is_finite() {
            Ok(())
        } else {
            Err(invalid(field, "min must be below max and the width finite"))
        }
    }
}

/// Simulated fleet parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FleetConfig {
    /// Number of panels.
    #[serde(default = "default_panel_count")]
    pub panel_count: u32,

    /// Initial power is a whole number of watts in `[0, initial_power_max)`.
    #[serde(default = "default_initial_power_max")]
    pub initial_power_max: u32,

    /// Largest per-tick power change in either direction.
    #[serde(default = "default_power_step")]
    pub power_step: f64,

    /// Upper clamp for panel power.
    #[serde(default = "default_power_max")]
    pub power_max: f64,

    /// Panels below this output are classified as warning.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Independent per-panel, per-tick fault probability.
    #[serde(default = "default_fault_probability")]
    pub fault_probability: f64,

    /// Voltage band, resampled every tick.
    #[serde(default = "default_voltage_band")]
    pub voltage: Band,

    /// Initial current band (current is derived after the first tick).
    #[serde(default = "default_current_band")]
    pub current: Band,

    /// Temperature band, resampled every tick.
    #[serde(default = "default_temperature_band")]
    pub temperature: Band,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            panel_count: default_panel_count(),
            initial_power_max: default_initial_power_max(),
            power_step: default_power_step(),
            power_max: default_power_max(),
            warning_threshold: default_warning_threshold(),
            fault_probability: default_fault_probability(),
            voltage: default_voltage_band(),
            current: default_current_band(),
            temperature: default_temperature_band(),
        }
    }
}

/// Subscriber fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Per-subscriber buffer. A subscriber that falls this far behind is
    /// dropped.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    3001
}

fn default_replay_path() -> PathBuf {
    PathBuf::from("final.csv")
}

const fn default_sample_size() -> usize {
    5
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_history_window() -> usize {
    60
}

const fn default_panel_count() -> u32 {
    30
}

const fn default_initial_power_max() -> u32 {
    50
}

const fn default_power_step() -> f64 {
    5.0
}

const fn default_power_max() -> f64 {
    60.0
}

const fn default_warning_threshold() -> f64 {
    10.0
}

const fn default_fault_probability() -> f64 {
    0.05
}

const fn default_voltage_band() -> Band {
    Band::new(30.0, 40.0)
}

const fn default_current_band() -> Band {
    Band::new(1.0, 6.0)
}

const fn default_temperature_band() -> Band {
    Band::new(20.0, 50.0)
}

const fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TwinConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.simulation.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.fleet.panel_count, 30);
        assert_eq!(config.replay.sample_size, 5);
        assert!(!config.replay.require_data);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8088

replay:
  path: "data/inverter.csv"
  sample_size: 3
  require_data: true

simulation:
  tick_interval_ms: 250
  history_window: 10
  seed: 99

fleet:
  panel_count: 12
  fault_probability: 0.1
  voltage:
    min: 24.0
    max: 36.0

broadcast:
  channel_capacity: 8

logging:
  level: "debug"
  json: true
"#;

        let config = TwinConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.replay.path, PathBuf::from("data/inverter.csv"));
        assert!(config.replay.require_data);
        assert_eq!(config.simulation.tick_interval_ms, 250);
        assert_eq!(config.simulation.seed, Some(99));
        assert_eq!(config.fleet.panel_count, 12);
        assert_eq!(config.fleet.voltage, Band::new(24.0, 36.0));
        // Untouched fleet fields keep their defaults.
        assert_eq!(config.fleet.temperature, Band::new(20.0, 50.0));
        assert_eq!(config.broadcast.channel_capacity, 8);
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = TwinConfig::parse(include_str!("../../../solar-twin.yaml"));
        assert!(config.is_ok_and(|c| c == TwinConfig::default()));
    }

    #[test]
    fn parse_empty_yaml() {
        let config = TwinConfig::parse("");
        assert!(config.is_ok_and(|c| c == TwinConfig::default()));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let config = TwinConfig::parse("simulation:\n  tick_interval_ms: 0\n")
            .ok()
            .unwrap_or_default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.tick_interval_ms", .. })
        ));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let mut config = TwinConfig::default();
        config.fleet.fault_probability = 1.5;
        assert!(config.validate().is_err());
        config.fleet.fault_probability = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut config = TwinConfig::default();
        config.fleet.temperature = Band::new(50.0, 20.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "fleet.temperature", .. })
        ));
    }

    #[test]
    fn unbounded_power_step_is_rejected() {
        for step in [f64::INFINITY, f64::NAN, 1e308, -1.0] {
            let mut config = TwinConfig::default();
            config.fleet.power_step = step;
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Invalid { field: "fleet.power_step", .. })
                ),
                "power_step {step} accepted"
            );
        }
    }

    #[test]
    fn non_finite_power_limits_are_rejected() {
        let mut config = TwinConfig::default();
        config.fleet.power_max = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "fleet.power_max", .. })
        ));

        let mut config = TwinConfig::default();
        config.fleet.warning_threshold = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "fleet.warning_threshold", .. })
        ));
    }

    #[test]
    fn oversized_buffers_are_rejected() {
        let mut config = TwinConfig::default();
        config.simulation.history_window = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "simulation.history_window", .. })
        ));

        let mut config = TwinConfig::default();
        config.broadcast.channel_capacity = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "broadcast.channel_capacity", .. })
        ));

        let mut config = TwinConfig::default();
        config.simulation.history_window = MAX_HISTORY_WINDOW;
        config.broadcast.channel_capacity = MAX_CHANNEL_CAPACITY;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn band_with_overflowing_width_is_rejected() {
        let mut config = TwinConfig::default();
        config.fleet.current = Band::new(-f64::MAX, f64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "fleet.current", .. })
        ));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = TwinConfig::parse("server: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
