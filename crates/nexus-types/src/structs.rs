//! Core entity structs for the Nexus city simulation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    BuildingType, EmergencyKind, EmergencyState, EngineId, EventType, PriorityClass, Severity,
    VehicleClass, VehicleStatus,
};
use crate::ids::{BuildingId, EmergencyId, EventId, ReasoningId, VehicleId};

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Integer grid coordinate. Ordered by `x`, then `y`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct GridPos {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl GridPos {
    /// Construct a position.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to `other`.
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }
}

impl core::fmt::Display for GridPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A closed road cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BlockedSegment {
    /// The closed cell.
    pub pos: GridPos,
    /// Why it was closed.
    pub reason: String,
    /// Tick at which the closure was placed.
    pub since_tick: u64,
    /// Tick at which the closure lifts by itself; `None` for manual closures.
    pub until_tick: Option<u64>,
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// A building on the grid.
///
/// Invariant: `allocated_power <= power_requirement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Building {
    /// Identifier.
    pub id: BuildingId,
    /// Building type.
    pub building_type: BuildingType,
    /// Cell occupied by the building.
    pub pos: GridPos,
    /// Power demand in units.
    pub power_requirement: u32,
    /// Power currently granted in units.
    pub allocated_power: u32,
    /// Allocation tier, derived from the building type.
    pub priority: PriorityClass,
}

impl Building {
    /// Create an unpowered building.
    pub const fn new(
        id: BuildingId,
        building_type: BuildingType,
        pos: GridPos,
        power_requirement: u32,
    ) -> Self {
        Self {
            id,
            building_type,
            pos,
            power_requirement,
            allocated_power: 0,
            priority: building_type.priority(),
        }
    }

    /// Allocated power as a percentage of the requirement, in `[0, 100]`.
    pub fn power_ratio_percent(&self) -> f64 {
        if self.power_requirement == 0 {
            return 100.0;
        }
        (f64::from(self.allocated_power) / f64::from(self.power_requirement) * 100.0)
            .clamp(0.0, 100.0)
    }
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// A vehicle in the fleet.
///
/// `path` holds the cells still to be visited, excluding the current
/// position; movement consumes one cell per tick from the front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Vehicle {
    /// Identifier.
    pub id: VehicleId,
    /// Vehicle class.
    pub class: VehicleClass,
    /// Current cell.
    pub pos: GridPos,
    /// Cell the vehicle is heading to, if any.
    pub destination: Option<GridPos>,
    /// Remaining cells to the destination.
    #[ts(as = "Vec<GridPos>")]
    pub path: VecDeque<GridPos>,
    /// Nominal speed in km/h (display only, movement is one cell per tick).
    pub speed: f64,
    /// Health in `[0, 100]`.
    pub health: f64,
    /// Energy in `[0, 100]`.
    pub energy: f64,
    /// Movement status.
    pub status: VehicleStatus,
    /// Emergency this vehicle is currently answering.
    pub assignment: Option<EmergencyId>,
    /// Base cell for emergency vehicles.
    pub home: Option<GridPos>,
}

impl Vehicle {
    /// Create an idle vehicle at full health.
    pub const fn new(id: VehicleId, class: VehicleClass, pos: GridPos, speed: f64, energy: f64) -> Self {
        Self {
            id,
            class,
            pos,
            destination: None,
            path: VecDeque::new(),
            speed,
            health: 100.0,
            energy,
            status: VehicleStatus::Idle,
            assignment: None,
            home: None,
        }
    }

    /// Whether this is an emergency responder.
    pub const fn is_emergency(&self) -> bool {
        self.class.is_emergency()
    }

    /// Whether the vehicle can take a new assignment.
    pub const fn is_available(&self) -> bool {
        self.assignment.is_none()
            && matches!(self.status, VehicleStatus::Idle | VehicleStatus::Returning)
    }

    /// Clear destination and path and park the vehicle.
    pub fn park(&mut self) {
        self.destination = None;
        self.path.clear();
        self.status = VehicleStatus::Idle;
    }
}

// ---------------------------------------------------------------------------
// Emergencies
// ---------------------------------------------------------------------------

/// A lifecycle transition that is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The requested state is not after the current one.
    #[error("emergency {id} cannot move from {from:?} to {to:?}")]
    Backwards {
        /// The emergency.
        id: EmergencyId,
        /// Current state.
        from: EmergencyState,
        /// Requested state.
        to: EmergencyState,
    },

    /// `assigned` and later states need a responder.
    #[error("emergency {id} has no assigned vehicle")]
    Unassigned {
        /// The emergency.
        id: EmergencyId,
    },
}

/// A reported emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Emergency {
    /// Identifier.
    pub id: EmergencyId,
    /// Accident or fire.
    pub kind: EmergencyKind,
    /// Cell where it happened.
    pub pos: GridPos,
    /// Severity on a 1..=10 scale.
    pub severity: u8,
    /// Tick at which it was reported.
    pub reported_tick: u64,
    /// Ticks since report.
    pub age: u64,
    /// Lifecycle state.
    pub state: EmergencyState,
    /// Responder, once assigned.
    pub assigned_vehicle: Option<VehicleId>,
}

impl Emergency {
    /// Create a freshly reported emergency.
    pub const fn new(
        id: EmergencyId,
        kind: EmergencyKind,
        pos: GridPos,
        severity: u8,
        reported_tick: u64,
    ) -> Self {
        Self {
            id,
            kind,
            pos,
            severity,
            reported_tick,
            age: 0,
            state: EmergencyState::Reported,
            assigned_vehicle: None,
        }
    }

    /// Whether the emergency has reached its terminal state.
    pub const fn is_resolved(&self) -> bool {
        matches!(self.state, EmergencyState::Resolved)
    }

    /// Record `vehicle` as the responder and move to `assigned`.
    pub fn assign(&mut self, vehicle: VehicleId) -> Result<(), TransitionError> {
        if self.state != EmergencyState::Reported {
            return Err(TransitionError::Backwards {
                id: self.id,
                from: self.state,
                to: EmergencyState::Assigned,
            });
        }
        self.assigned_vehicle = Some(vehicle);
        self.state = EmergencyState::Assigned;
        Ok(())
    }

    /// Move forward to `to`. Staying in the current state is a no-op.
    pub fn advance_to(&mut self, to: EmergencyState) -> Result<(), TransitionError> {
        if to < self.state {
            return Err(TransitionError::Backwards {
                id: self.id,
                from: self.state,
                to,
            });
        }
        if to >= EmergencyState::Assigned && self.assigned_vehicle.is_none() {
            return Err(TransitionError::Unassigned { id: self.id });
        }
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Events and reasoning
// ---------------------------------------------------------------------------

/// An immutable record of something that happened during a tick or
/// in response to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Identifier.
    pub id: EventId,
    /// Tick during which the event happened.
    pub tick: u64,
    /// Wall-clock time of creation.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub event_type: EventType,
    /// Severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Structured details.
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        tick: u64,
        event_type: EventType,
        severity: Severity,
        description: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            tick,
            timestamp: Utc::now(),
            event_type,
            severity,
            description: description.into(),
            payload,
        }
    }
}

/// An immutable explanation of one engine decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ReasoningLogEntry {
    /// Identifier.
    pub id: ReasoningId,
    /// Tick during which the decision was made.
    pub tick: u64,
    /// Wall-clock time of recording.
    pub timestamp: DateTime<Utc>,
    /// Engine that made the decision.
    pub engine: EngineId,
    /// Short decision label.
    pub decision: String,
    /// Rendered natural-language explanation.
    pub explanation: String,
    /// Ordered reasoning steps behind the decision.
    pub steps: Vec<String>,
    /// Structured inputs.
    pub inputs: Option<serde_json::Value>,
    /// Structured outputs.
    pub outputs: Option<serde_json::Value>,
    /// Confidence in `[0, 1]`.
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance() {
        assert_eq!(GridPos::new(0, 0).manhattan(GridPos::new(4, 4)), 8);
        assert_eq!(GridPos::new(3, 1).manhattan(GridPos::new(1, 3)), 4);
    }

    #[test]
    fn building_priority_follows_type() {
        let b = Building::new(BuildingId(1), BuildingType::Hospital, GridPos::new(1, 1), 150);
        assert_eq!(b.priority, PriorityClass::Critical);
        assert_eq!(b.allocated_power, 0);
    }

    #[test]
    fn emergency_lifecycle_moves_forward_only() {
        let mut e = Emergency::new(EmergencyId(1), EmergencyKind::Fire, GridPos::new(2, 2), 5, 0);
        assert!(e.advance_to(EmergencyState::EnRoute).is_err());
        assert!(e.assign(VehicleId(4)).is_ok());
        assert!(e.advance_to(EmergencyState::EnRoute).is_ok());
        assert!(e.advance_to(EmergencyState::EnRoute).is_ok());
        assert!(e.advance_to(EmergencyState::Assigned).is_err());
        assert!(e.advance_to(EmergencyState::Resolved).is_ok());
        assert!(e.is_resolved());
        assert!(e.assign(VehicleId(5)).is_err());
        assert_eq!(e.assigned_vehicle, Some(VehicleId(4)));
    }

    #[test]
    fn vehicle_emergency_flag_follows_class() {
        let amb = Vehicle::new(VehicleId(1), VehicleClass::Ambulance, GridPos::default(), 70.0, 100.0);
        let car = Vehicle::new(VehicleId(2), VehicleClass::Normal, GridPos::default(), 50.0, 80.0);
        assert!(amb.is_emergency());
        assert!(!car.is_emergency());
        assert!(amb.is_available());
    }
}
