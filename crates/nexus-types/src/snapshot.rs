//! Read-only views handed to query callers and subscribers.
//!
//! Every value here is an owned copy taken at a tick boundary; nothing
//! in it aliases the live world.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{SimulationPhase, Weather};
use crate::structs::{BlockedSegment, Building, Emergency, Vehicle};

/// Result of every lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationStatus {
    /// Orchestrator phase after the command.
    pub state: SimulationPhase,
    /// Completed tick count.
    pub tick: u64,
    /// Current weather.
    pub weather: Weather,
}

/// Full copy of the city at a tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CitySnapshot {
    /// Completed tick count.
    pub tick: u64,
    /// Current weather.
    pub weather: Weather,
    /// Side length of the square grid.
    pub grid_size: u32,
    /// All vehicles, in id order.
    pub vehicles: Vec<Vehicle>,
    /// All buildings, in id order.
    pub buildings: Vec<Building>,
    /// Emergencies that are not yet resolved, in id order.
    pub emergencies: Vec<Emergency>,
    /// Closed road cells.
    pub blocked_roads: Vec<BlockedSegment>,
}

/// Per-algorithm routing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RoutingStats {
    /// Searches run.
    pub calls: u64,
    /// Searches that found a path.
    pub successes: u64,
    /// Mean length in cells of found paths.
    pub mean_path_length: f64,
    /// Total nodes expanded across all searches.
    pub nodes_expanded: u64,
}

/// Aggregate metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Metrics {
    /// Completed tick count.
    pub tick: u64,
    /// Overall efficiency in `[0, 100]`.
    pub efficiency_score: f64,
    /// Fleet size.
    pub total_vehicles: u32,
    /// Vehicles currently following a path.
    pub moving_vehicles: u32,
    /// Emergency vehicles in the fleet.
    pub emergency_vehicles: u32,
    /// Emergencies reported since the last restart.
    pub total_emergencies: u32,
    /// Emergencies not yet resolved.
    pub open_emergencies: u32,
    /// Emergencies resolved since the last restart.
    pub resolved_emergencies: u32,
    /// Allocated power as a percentage of capacity, in `[0, 100]`.
    pub power_utilization: f64,
    /// Current weather.
    pub weather: Weather,
    /// Routing statistics keyed by algorithm name.
    pub routing: BTreeMap<String, RoutingStats>,
    /// Reasoning entries recorded per engine since the last restart.
    pub reasoning_counts: BTreeMap<String, u64>,
}
