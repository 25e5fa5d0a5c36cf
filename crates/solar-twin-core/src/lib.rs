//! Fleet model, replay source, and simulation engine for Solar Twin.
//!
//! This crate owns the tick cycle that drives the digital twin: each tick
//! advances the simulated panel fleet, pairs it with the next pre-recorded
//! reading, and fans the combined frame out to every live subscriber.
//!
//! # Modules
//!
//! - [`broadcast`] -- Subscriber registry with isolated, non-blocking
//!   delivery.
//! - [`config`] -- Configuration loading from `solar-twin.yaml` into
//!   strongly-typed structs.
//! - [`engine`] -- [`SimulationEngine`]: run state, replay cursor, and the
//!   tick task.
//! - [`fleet`] -- The simulated panel fleet and its aggregate metrics.
//! - [`replay`] -- CSV replay dataset loading.
//!
//! [`SimulationEngine`]: engine::SimulationEngine

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod fleet;
pub mod replay;

pub use broadcast::{Broadcaster, DeliveryFailure, SubscriberSink, Subscription};
pub use config::{ConfigError, TwinConfig};
pub use engine::{EngineError, EngineSettings, SimulationEngine};
pub use fleet::Fleet;
pub use replay::{FieldPolicy, LoadError, ReplaySource};
