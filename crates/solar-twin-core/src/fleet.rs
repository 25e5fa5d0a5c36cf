//! Simulated panel fleet.
//!
//! The [`Fleet`] owns a fixed set of [`Panel`]s and advances each of them
//! by one synthetic step per tick. Randomness is injected by the caller so
//! the engine can own a seeded source and tests can pin outcomes.
//!
//! # Per-tick step
//!
//! 1. Power moves by a uniform delta in `[-power_step, power_step)` and is
//!    clamped to `[0, power_max]`.
//! 2. An independent fault draw with `fault_probability` forces power to
//!    zero and status to [`PanelStatus::Fault`]. The fault outcome wins
//!    over the clamped update.
//! 3. Otherwise the panel is [`PanelStatus::Warning`] below
//!    `warning_threshold`, else [`PanelStatus::Normal`].
//! 4. Voltage and temperature are resampled from their bands; current is
//!    `power / voltage`, or zero when the panel produces nothing.

use chrono::Utc;
use rand::Rng;
use solar_twin_types::{FleetMetrics, Panel, PanelCount, PanelStatus};

use crate::config::{Band, FleetConfig};

/// The simulated fleet.
///
/// Only the engine's tick handler mutates it.
#[derive(Debug, Clone)]
pub struct Fleet {
    panels: Vec<Panel>,
    config: FleetConfig,
}

impl Fleet {
    /// Create `config.panel_count` panels with randomized plausible
    /// readings, all [`PanelStatus::Normal`].
    pub fn initialize<R: Rng + ?Sized>(config: &FleetConfig, rng: &mut R) -> Self {
        let now = Utc::now();
        let panels = (1..=config.panel_count)
            .map(|n| Panel {
                id: panel_id(n),
                power: initial_power(config.initial_power_max, rng),
                voltage: sample(config.voltage, rng),
                current: sample(config.current, rng),
                temperature: sample(config.temperature, rng),
                status: PanelStatus::Normal,
                last_update: now,
            })
            .collect();

        Self {
            panels,
            config: config.clone(),
        }
    }

    /// Advance every panel by one step.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let now = Utc::now();
        let cfg = &self.config;

        for panel in &mut self.panels {
            let delta = sample(Band::new(-cfg.power_step, cfg.power_step), rng);
            panel.power = (panel.power + delta).max(0.0).min(cfg.power_max);

            // Compared against a uniform draw so a probability of 1.0 always
            // faults and 0.0 never does.
            if rng.random::<f64>() < cfg.fault_probability {
                panel.power = 0.0;
                panel.status = PanelStatus::Fault;
            } else if panel.power < cfg.warning_threshold {
                panel.status = PanelStatus::Warning;
            } else {
                panel.status = PanelStatus::Normal;
            }

            panel.voltage = sample(cfg.voltage, rng);
            panel.current = if panel.power > 0.0 && panel.voltage > 0.0 {
                panel.power / panel.voltage
            } else {
                0.0
            };
            panel.temperature = sample(cfg.temperature, rng);
            panel.last_update = now;
        }
    }

    /// Fleet-wide metrics over the current panels.
    ///
    /// Pure: repeated calls between ticks return identical values. An empty
    /// fleet reports zero means.
    pub fn aggregate(&self) -> FleetMetrics {
        let mut metrics = FleetMetrics::default();
        let mut voltage_sum = 0.0;
        let mut current_sum = 0.0;
        let mut temperature_sum = 0.0;

        for panel in &self.panels {
            metrics.total_power += panel.power;
            voltage_sum += panel.voltage;
            current_sum += panel.current;
            temperature_sum += panel.temperature;

            let bucket = match panel.status {
                PanelStatus::Normal => &mut metrics.panel_count.normal,
                PanelStatus::Warning => &mut metrics.panel_count.warning,
                PanelStatus::Fault => &mut metrics.panel_count.fault,
            };
            *bucket = bucket.saturating_add(1);
        }

        let total = u32::try_from(self.panels.len()).unwrap_or(u32::MAX);
        metrics.panel_count = PanelCount {
            total,
            ..metrics.panel_count
        };

        if total > 0 {
            let n = f64::from(total);
            metrics.avg_voltage = voltage_sum / n;
            metrics.avg_current = current_sum / n;
            metrics.avg_temperature = temperature_sum / n;
        }

        metrics
    }

    /// The panels in id order.
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// Whether the fleet has no panels.
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

/// `P01`, `P02`, ... (wider once the fleet passes 99 panels).
fn panel_id(n: u32) -> String {
    format!("P{n:02}")
}

fn initial_power<R: Rng + ?Sized>(max: u32, rng: &mut R) -> f64 {
    if max == 0 {
        return 0.0;
    }
    f64::from(rng.random_range(0..max))
}

/// Uniform draw from `band`. A degenerate band, or one whose width is not
/// finite, yields its lower bound.
fn sample<R: Rng + ?Sized>(band: Band, rng: &mut R) -> f64 {
    if band.max > band.min && (band.max - band.min).is_finite() {
        rng.random_range(band.min..band.max)
    } else {
        band.min
    }
}
