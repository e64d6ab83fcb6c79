//! Shared type definitions for the Nexus city simulation.
//!
//! This crate is the single source of truth for the types that cross
//! crate boundaries: the world entities owned by the orchestrator, the
//! events and reasoning entries produced by the engines, and the
//! read-only snapshots handed to callers. Types flow to `TypeScript`
//! via `ts-rs` for any dashboard built on top.
//!
//! # Modules
//!
//! - [`ids`] -- UUID and sequential identifier newtypes
//! - [`enums`] -- Enumeration types (weather, classes, lifecycle states)
//! - [`structs`] -- Entity structs (buildings, vehicles, emergencies, events)
//! - [`snapshot`] -- Query results (city snapshot, status, metrics)
//! - [`notification`] -- Outbound bus messages

pub mod enums;
pub mod ids;
pub mod notification;
pub mod snapshot;
pub mod structs;

pub use enums::{
    BuildingType, CellKind, EmergencyKind, EmergencyState, EngineId, EventType, ParseEnumError,
    PriorityClass, Severity, SimulationPhase, VehicleClass, VehicleStatus, Weather,
};
pub use ids::{BuildingId, EmergencyId, EventId, PlanId, ReasoningId, VehicleId};
pub use notification::{ConnectionStatus, Notification, Pong};
pub use snapshot::{CitySnapshot, Metrics, RoutingStats, SimulationStatus};
pub use structs::{
    BlockedSegment, Building, Emergency, Event, GridPos, ReasoningLogEntry, TransitionError,
    Vehicle,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::VehicleId::export_all();
        let _ = crate::enums::Weather::export_all();
        let _ = crate::enums::EngineId::export_all();
        let _ = crate::structs::Vehicle::export_all();
        let _ = crate::structs::Emergency::export_all();
        let _ = crate::snapshot::CitySnapshot::export_all();
        let _ = crate::snapshot::Metrics::export_all();
        let _ = crate::notification::Notification::export_all();
    }
}
