//! Enumeration types for the Nexus city simulation.
//!
//! All enums serialize as `snake_case` strings, which is also the form
//! accepted by their [`FromStr`] implementations at the command boundary.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A string did not name a valid variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value:?}")]
pub struct ParseEnumError {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// City-wide weather. Changes only on explicit command.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Weather {
    /// Dry roads.
    #[default]
    Clear,
    /// Wet roads, slower travel and more accidents.
    Rain,
    /// Icy roads, the most hazardous condition.
    Snow,
}

impl Weather {
    /// All weather values in declaration order.
    pub const ALL: [Self; 3] = [Self::Clear, Self::Rain, Self::Snow];

    /// Wire name of this weather value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Rain => "rain",
            Self::Snow => "snow",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weather {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == needle)
            .ok_or_else(|| ParseEnumError {
                kind: "weather",
                value: s.to_owned(),
            })
    }
}

/// What occupies a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CellKind {
    /// Drivable road.
    Road,
    /// Occupied by a building. Only enterable as a route endpoint.
    Building,
    /// Open park land, drivable.
    Park,
    /// Permanently closed to traffic.
    Restricted,
}

impl CellKind {
    /// Whether vehicles may drive through a cell of this kind.
    pub const fn is_drivable(self) -> bool {
        matches!(self, Self::Road | Self::Park)
    }
}

/// Kind of building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BuildingType {
    /// Housing.
    Residential,
    /// Shops and offices.
    Commercial,
    /// Factories.
    Industrial,
    /// Home base for ambulances.
    Hospital,
    /// Home base for fire trucks.
    FireStation,
}

impl BuildingType {
    /// The allocation priority class of this building type.
    pub const fn priority(self) -> PriorityClass {
        match self {
            Self::Hospital | Self::FireStation => PriorityClass::Critical,
            Self::Industrial | Self::Commercial => PriorityClass::High,
            Self::Residential => PriorityClass::Normal,
        }
    }

    /// Wire name of this building type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::Commercial => "commercial",
            Self::Industrial => "industrial",
            Self::Hospital => "hospital",
            Self::FireStation => "fire_station",
        }
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power allocation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum PriorityClass {
    /// Guaranteed 80% of requirement when capacity allows.
    Critical,
    /// Guaranteed 50% of requirement when capacity allows.
    High,
    /// Served from whatever remains.
    Normal,
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// Vehicle class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum VehicleClass {
    /// Civilian traffic.
    Normal,
    /// Responds to accidents, based at the hospital.
    Ambulance,
    /// Responds to fires, based at the fire station.
    FireTruck,
}

impl VehicleClass {
    /// Whether this class is an emergency responder.
    pub const fn is_emergency(self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Wire name of this class.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Ambulance => "ambulance",
            Self::FireTruck => "fire_truck",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement status of a vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum VehicleStatus {
    /// Parked, no destination.
    #[default]
    Idle,
    /// Following a path.
    Moving,
    /// Has a destination but routing currently finds no path.
    Stuck,
    /// Heading back to base after an emergency.
    Returning,
}

// ---------------------------------------------------------------------------
// Emergencies
// ---------------------------------------------------------------------------

/// Kind of emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EmergencyKind {
    /// Traffic accident, answered by an ambulance.
    Accident,
    /// Building or street fire, answered by a fire truck.
    Fire,
}

impl EmergencyKind {
    /// The vehicle class dispatched to this kind of emergency.
    pub const fn responder(self) -> VehicleClass {
        match self {
            Self::Accident => VehicleClass::Ambulance,
            Self::Fire => VehicleClass::FireTruck,
        }
    }

    /// Wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accident => "accident",
            Self::Fire => "fire",
        }
    }
}

impl fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an emergency. Variants are declared in lifecycle order,
/// so the derived [`Ord`] is the permitted transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EmergencyState {
    /// Spawned, no responder yet.
    Reported,
    /// A responder has been assigned.
    Assigned,
    /// The responder is driving to the scene.
    EnRoute,
    /// The responder is working on site.
    Resolving,
    /// Terminal.
    Resolved,
}

// ---------------------------------------------------------------------------
// Events and reasoning
// ---------------------------------------------------------------------------

/// Severity of an event or rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate attention.
    Critical,
}

/// The closed set of reasoning engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EngineId {
    /// A*, Dijkstra and BFS path search.
    Routing,
    /// Constraint-based power allocation.
    Allocation,
    /// Condition/action rules.
    Rules,
    /// Probabilistic emergency generator.
    Probabilistic,
    /// Hierarchical task planner.
    Planner,
    /// Explanation recorder.
    Explainability,
}

impl EngineId {
    /// All engines in tick order.
    pub const ALL: [Self; 6] = [
        Self::Probabilistic,
        Self::Routing,
        Self::Rules,
        Self::Allocation,
        Self::Planner,
        Self::Explainability,
    ];

    /// Wire name of this engine.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Allocation => "allocation",
            Self::Rules => "rules",
            Self::Probabilistic => "probabilistic",
            Self::Planner => "planner",
            Self::Explainability => "explainability",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineId {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == needle)
            .ok_or_else(|| ParseEnumError {
                kind: "engine",
                value: s.to_owned(),
            })
    }
}

/// Category of a simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventType {
    /// The simulation entered `running`.
    SimulationStarted,
    /// The simulation entered `paused`.
    SimulationPaused,
    /// The simulation entered `stopped`.
    SimulationStopped,
    /// The world was re-initialized.
    SimulationRestarted,
    /// Weather changed by command.
    WeatherChanged,
    /// A road cell was closed.
    RoadBlocked,
    /// A road cell was reopened.
    RoadUnblocked,
    /// A new emergency was reported.
    EmergencySpawned,
    /// A responder was assigned to an emergency.
    EmergencyAssigned,
    /// An emergency reached `resolved`.
    EmergencyResolved,
    /// An emergency was withdrawn and its plan abandoned.
    EmergencyCancelled,
    /// A vehicle could not find a path.
    VehicleStuck,
    /// A condition/action rule fired.
    RuleFired,
    /// Power was reallocated with all floors met.
    PowerAllocated,
    /// Power was reallocated below one or more priority floors.
    PowerShortage,
    /// An engine returned an internal fault.
    EngineFault,
}

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SimulationPhase {
    /// Not ticking, queries unavailable.
    #[default]
    Stopped,
    /// Ticking at the configured rate.
    Running,
    /// Not ticking, queries available.
    Paused,
}

impl SimulationPhase {
    /// Whether external queries return live data in this phase.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_parses_case_insensitively() {
        assert_eq!("rain".parse::<Weather>(), Ok(Weather::Rain));
        assert_eq!(" Snow ".parse::<Weather>(), Ok(Weather::Snow));
        assert!("fog".parse::<Weather>().is_err());
    }

    #[test]
    fn weather_serializes_snake_case() {
        let json = serde_json::to_string(&Weather::Clear).ok();
        assert_eq!(json.as_deref(), Some("\"clear\""));
    }

    #[test]
    fn priority_derived_from_type() {
        assert_eq!(BuildingType::Hospital.priority(), PriorityClass::Critical);
        assert_eq!(BuildingType::FireStation.priority(), PriorityClass::Critical);
        assert_eq!(BuildingType::Industrial.priority(), PriorityClass::High);
        assert_eq!(BuildingType::Commercial.priority(), PriorityClass::High);
        assert_eq!(BuildingType::Residential.priority(), PriorityClass::Normal);
    }

    #[test]
    fn emergency_states_are_ordered_by_lifecycle() {
        assert!(EmergencyState::Reported < EmergencyState::Assigned);
        assert!(EmergencyState::Assigned < EmergencyState::EnRoute);
        assert!(EmergencyState::EnRoute < EmergencyState::Resolving);
        assert!(EmergencyState::Resolving < EmergencyState::Resolved);
    }

    #[test]
    fn responder_matches_kind() {
        assert_eq!(EmergencyKind::Accident.responder(), VehicleClass::Ambulance);
        assert_eq!(EmergencyKind::Fire.responder(), VehicleClass::FireTruck);
        assert!(VehicleClass::Ambulance.is_emergency());
        assert!(!VehicleClass::Normal.is_emergency());
    }

    #[test]
    fn engine_id_round_trips_through_str() {
        for engine in EngineId::ALL {
            assert_eq!(engine.as_str().parse::<EngineId>(), Ok(engine));
        }
    }
}
