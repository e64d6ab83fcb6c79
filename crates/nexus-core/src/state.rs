//! The mutable world owned by the orchestrator.

use std::collections::BTreeMap;

use nexus_reasoning::CityContext;
use nexus_types::{
    CitySnapshot, Emergency, EmergencyId, Vehicle, VehicleId, VehicleStatus,
};
use nexus_world::{CityMap, WorldError, create_starting_city, spawn_fleet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{FleetConfig, WorldConfig};

/// Draws allowed when picking a wander destination.
const WANDER_ATTEMPTS: u32 = 50;

/// City, fleet, emergencies and the tick counter.
///
/// Engines never hold on to this; the tick cycle lends them the fields
/// they are allowed to touch.
#[derive(Debug, Clone)]
pub struct CityState {
    /// Grid, buildings, closures and weather.
    pub city: CityMap,
    /// The fleet, keyed by id.
    pub vehicles: BTreeMap<VehicleId, Vehicle>,
    /// Open emergencies, plus those resolved during the last tick.
    pub emergencies: BTreeMap<EmergencyId, Emergency>,
    /// Completed ticks.
    pub tick: u64,
    /// Emergencies resolved and pruned.
    pub resolved: u64,
    /// Emergencies withdrawn by command.
    pub cancelled: u64,
    next_emergency: EmergencyId,
    rng: StdRng,
}

impl CityState {
    /// Generate the starting city and fleet from a seed.
    pub fn generate(world: &WorldConfig, fleet: &FleetConfig) -> Result<Self, WorldError> {
        let mut rng = StdRng::seed_from_u64(world.seed);
        let city = create_starting_city(world.grid_size, &mut rng)?;
        let vehicles = spawn_fleet(
            &city,
            fleet.normal_vehicles,
            fleet.emergency_vehicles,
            &mut rng,
        )?;
        Ok(Self::from_parts(city, vehicles, rng))
    }

    /// Assemble a state from a hand-built city and fleet.
    pub fn from_parts(city: CityMap, vehicles: Vec<Vehicle>, rng: StdRng) -> Self {
        Self {
            city,
            vehicles: vehicles.into_iter().map(|v| (v.id, v)).collect(),
            emergencies: BTreeMap::new(),
            tick: 0,
            resolved: 0,
            cancelled: 0,
            next_emergency: EmergencyId(1),
            rng,
        }
    }

    /// Reserve the next emergency id.
    pub const fn allocate_emergency_id(&mut self) -> Option<EmergencyId> {
        let id = self.next_emergency;
        match id.next() {
            Some(next) => {
                self.next_emergency = next;
                Some(id)
            }
            None => None,
        }
    }

    /// World random stream (wandering).
    pub const fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Give each idle, unassigned civilian a random destination with
    /// probability `probability`. Returns the vehicles that set off.
    pub fn wander(&mut self, probability: f64) -> Vec<VehicleId> {
        let mut started = Vec::new();
        for vehicle in self.vehicles.values_mut() {
            if vehicle.is_emergency()
                || vehicle.assignment.is_some()
                || vehicle.destination.is_some()
                || vehicle.status != VehicleStatus::Idle
            {
                continue;
            }
            if self.rng.random::<f64>() >= probability {
                continue;
            }
            match self.city.random_drivable_cell(&mut self.rng, WANDER_ATTEMPTS) {
                Some(target) if target != vehicle.pos => {
                    vehicle.destination = Some(target);
                    started.push(vehicle.id);
                }
                _ => {}
            }
        }
        started
    }

    /// Vehicles following a path.
    pub fn moving_vehicles(&self) -> u32 {
        count(
            self.vehicles
                .values()
                .filter(|v| matches!(v.status, VehicleStatus::Moving | VehicleStatus::Returning)),
        )
    }

    /// Emergency vehicles in the fleet.
    pub fn emergency_vehicles(&self) -> u32 {
        count(self.vehicles.values().filter(|v| v.is_emergency()))
    }

    /// Emergencies not yet resolved.
    pub fn open_emergencies(&self) -> impl Iterator<Item = &Emergency> {
        self.emergencies.values().filter(|e| !e.is_resolved())
    }

    /// Resolved emergencies, pruned or not.
    pub fn resolved_emergencies(&self) -> u64 {
        let pending = self.emergencies.values().filter(|e| e.is_resolved()).count();
        self.resolved
            .saturating_add(u64::try_from(pending).unwrap_or(u64::MAX))
    }

    /// Drop emergencies resolved in an earlier tick. Returns how many.
    pub fn prune_resolved(&mut self) -> usize {
        let before = self.emergencies.len();
        self.emergencies.retain(|_, e| !e.is_resolved());
        let pruned = before.saturating_sub(self.emergencies.len());
        self.resolved = self
            .resolved
            .saturating_add(u64::try_from(pruned).unwrap_or(u64::MAX));
        pruned
    }

    /// City-wide aggregate for the rule engine at `tick`.
    pub fn city_context(&self, tick: u64, capacity: u32) -> CityContext {
        let open: Vec<&Emergency> = self.open_emergencies().collect();
        CityContext {
            tick,
            weather: self.city.weather(),
            total_demand: self.city.total_demand(),
            capacity,
            moving_vehicles: self.moving_vehicles(),
            open_emergencies: count(open.iter()),
            unassigned_emergencies: count(open.iter().filter(|e| e.assigned_vehicle.is_none())),
            available_responders: count(
                self.vehicles
                    .values()
                    .filter(|v| v.is_emergency() && v.is_available()),
            ),
            oldest_open_age: open.iter().map(|e| e.age).max().unwrap_or(0),
        }
    }

    /// Deep copy for callers.
    pub fn snapshot(&self) -> CitySnapshot {
        CitySnapshot {
            tick: self.tick,
            weather: self.city.weather(),
            grid_size: self.city.size(),
            vehicles: self.vehicles.values().cloned().collect(),
            buildings: self.city.buildings().cloned().collect(),
            emergencies: self.emergencies.values().cloned().collect(),
            blocked_roads: self.city.blocked_segments().cloned().collect(),
        }
    }
}

fn count<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;
    use nexus_types::{EmergencyKind, GridPos, VehicleClass};

    #[test]
    fn generate_is_deterministic() {
        let a = CityState::generate(&WorldConfig::default(), &FleetConfig::default()).unwrap();
        let b = CityState::generate(&WorldConfig::default(), &FleetConfig::default()).unwrap();
        assert_eq!(a.vehicles, b.vehicles);
        assert_eq!(a.snapshot().buildings, b.snapshot().buildings);
        assert_eq!(a.vehicles.len(), 10);
        assert_eq!(a.emergency_vehicles(), 2);
    }

    #[test]
    fn prune_counts_resolved() {
        let city = CityMap::new(4).unwrap();
        let v = Vehicle::new(VehicleId(1), VehicleClass::Ambulance, GridPos::new(0, 0), 70.0, 100.0);
        let mut state = CityState::from_parts(city, vec![v], StdRng::seed_from_u64(1));
        let id = state.allocate_emergency_id().unwrap();
        let mut e = Emergency::new(id, EmergencyKind::Accident, GridPos::new(1, 1), 5, 0);
        e.assign(VehicleId(1)).unwrap();
        e.advance_to(nexus_types::EmergencyState::Resolved).unwrap();
        state.emergencies.insert(id, e);

        assert_eq!(state.resolved_emergencies(), 1);
        assert_eq!(state.open_emergencies().count(), 0);
        assert_eq!(state.prune_resolved(), 1);
        assert!(state.emergencies.is_empty());
        assert_eq!(state.resolved_emergencies(), 1);
        assert_eq!(state.allocate_emergency_id(), Some(EmergencyId(2)));
    }

    #[test]
    fn wander_only_moves_idle_civilians() {
        let city = CityMap::new(6).unwrap();
        let civ = Vehicle::new(VehicleId(1), VehicleClass::Normal, GridPos::new(0, 0), 50.0, 90.0);
        let amb = Vehicle::new(VehicleId(2), VehicleClass::Ambulance, GridPos::new(3, 3), 70.0, 90.0);
        let mut state = CityState::from_parts(city, vec![civ, amb], StdRng::seed_from_u64(3));

        assert!(state.wander(0.0).is_empty());
        let started = state.wander(1.0);
        assert!(started.len() <= 1);
        assert!(state.vehicles[&VehicleId(2)].destination.is_none());
        if started == vec![VehicleId(1)] {
            assert!(state.vehicles[&VehicleId(1)].destination.is_some());
            // Already has a destination, so it is left alone.
            assert!(state.wander(1.0).is_empty());
        }
    }
}
