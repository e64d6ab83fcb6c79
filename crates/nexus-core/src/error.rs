//! Errors surfaced to callers of the orchestrator.
//!
//! Only command validation failures and queries against a stopped
//! simulation reach callers. Faults inside a tick are recovered and show
//! up as events instead.

use nexus_types::{EmergencyId, ParseEnumError, SimulationPhase};
use nexus_world::WorldError;

use crate::config::ConfigError;

/// A command was rejected; world state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The weather value is not one of `clear`, `rain`, `snow`.
    #[error("invalid weather: {source}")]
    InvalidWeather {
        /// The parse failure.
        #[from]
        source: ParseEnumError,
    },

    /// The command referenced a cell the world rejects.
    #[error("invalid cell: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// No open emergency with this id.
    #[error("unknown emergency {0}")]
    UnknownEmergency(EmergencyId),
}

/// A query could not be answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Live data is only served while running or paused.
    #[error("simulation is {0:?}; live data is only available while running or paused")]
    NotLive(SimulationPhase),

    /// The engine id used as a filter is not recognised.
    #[error("unknown engine filter: {source}")]
    UnknownEngine {
        /// The parse failure.
        #[from]
        source: ParseEnumError,
    },
}

/// Failure to build a simulation from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The starting city could not be generated.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}
