//! Error types for the reasoning engines.
//!
//! An [`EngineError`] is an internal fault. The orchestrator catches it at
//! the per-engine call boundary, records it as a critical event and lets
//! the rest of the tick run.

use nexus_types::{EmergencyId, EngineId, PlanId, TransitionError, VehicleId};
use nexus_world::WorldError;

/// Internal fault raised by an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A world operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// An emergency lifecycle transition was rejected.
    #[error("lifecycle error: {source}")]
    Transition {
        /// The underlying transition error.
        #[from]
        source: TransitionError,
    },

    /// A plan referenced a vehicle that does not exist.
    #[error("plan {plan} references unknown vehicle {vehicle}")]
    UnknownVehicle {
        /// The plan.
        plan: PlanId,
        /// The missing vehicle.
        vehicle: VehicleId,
    },

    /// A plan referenced an emergency that does not exist.
    #[error("plan {plan} references unknown emergency {emergency}")]
    UnknownEmergency {
        /// The plan.
        plan: PlanId,
        /// The missing emergency.
        emergency: EmergencyId,
    },

    /// An engine detected a broken invariant in its own output.
    #[error("{engine} invariant violated: {detail}")]
    Invariant {
        /// The engine.
        engine: EngineId,
        /// What went wrong.
        detail: String,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(EngineId),
}
