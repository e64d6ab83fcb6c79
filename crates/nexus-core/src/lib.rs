//! Orchestration for the Nexus city simulation.
//!
//! This crate owns the world and drives the reasoning engines through a
//! fixed-order tick cycle.
//!
//! # Modules
//!
//! - [`bus`] -- Broadcast notification bus with lag accounting.
//! - [`config`] -- YAML configuration loading and typed config structures.
//! - [`error`] -- Command, query and setup errors.
//! - [`history`] -- Bounded event history.
//! - [`metrics`] -- Aggregate metrics and the efficiency score.
//! - [`orchestrator`] -- [`Simulation`]: lifecycle, commands, queries.
//! - [`runner`] -- [`SimulationHandle`] and the paced tick loop.
//! - [`state`] -- [`CityState`]: city, fleet, emergencies, tick counter.
//! - [`tick`] -- The per-tick phase sequence with engine fault isolation.

pub mod bus;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod runner;
pub mod state;
pub mod tick;

pub use bus::{EventBus, Subscription};
pub use config::{ConfigError, SimulationConfig};
pub use error::{CommandError, QueryError, SetupError};
pub use orchestrator::Simulation;
pub use runner::{NoOpCallback, SimulationHandle, TickCallback, run_loop};
pub use state::CityState;
pub use tick::{Engines, TickSummary, run_tick};
