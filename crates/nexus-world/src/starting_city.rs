//! Default starting city.
//!
//! The reference layout is drawn on a 20x20 grid and scaled to the
//! configured size: a hospital and a fire station near the middle row,
//! a residential zone in the north-west, commercial in the north-east,
//! industrial in the south-west, three parks and two restricted cells.
//! Zone buildings are scattered with the seeded generator.

use nexus_types::{Building, BuildingId, BuildingType, CellKind, GridPos, Vehicle, VehicleClass, VehicleId};
use rand::Rng;
use tracing::debug;

use crate::city::CityMap;
use crate::error::WorldError;

/// Side length of the reference layout.
const REFERENCE_SIZE: u32 = 20;

/// Draws allowed when scattering a building or vehicle.
pub const PLACEMENT_ATTEMPTS: u32 = 50;

const RESTRICTED: [(u32, u32); 2] = [(2, 2), (18, 18)];
const PARKS: [(u32, u32); 3] = [(10, 5), (15, 15), (5, 18)];
const HOSPITAL: (u32, u32) = (5, 10);
const FIRE_STATION: (u32, u32) = (15, 10);

/// A zone of randomly placed buildings, in reference coordinates.
struct Zone {
    building_type: BuildingType,
    count: u32,
    x: (u32, u32),
    y: (u32, u32),
    power: (u32, u32),
}

const ZONES: [Zone; 3] = [
    Zone {
        building_type: BuildingType::Residential,
        count: 5,
        x: (0, 8),
        y: (0, 8),
        power: (30, 60),
    },
    Zone {
        building_type: BuildingType::Commercial,
        count: 6,
        x: (12, 20),
        y: (0, 8),
        power: (50, 100),
    },
    Zone {
        building_type: BuildingType::Industrial,
        count: 4,
        x: (0, 8),
        y: (12, 20),
        power: (100, 200),
    },
];

/// Power requirement of the hospital.
pub const HOSPITAL_POWER: u32 = 150;
/// Power requirement of the fire station.
pub const FIRE_STATION_POWER: u32 = 100;

/// Map a reference coordinate onto a grid of side `size`.
fn scale(coord: u32, size: u32) -> u32 {
    let scaled = u64::from(coord)
        .saturating_mul(u64::from(size))
        .checked_div(u64::from(REFERENCE_SIZE))
        .unwrap_or(0);
    u32::try_from(scaled)
        .unwrap_or(u32::MAX)
        .min(size.saturating_sub(1))
}

fn scaled_pos((x, y): (u32, u32), size: u32) -> GridPos {
    GridPos::new(scale(x, size), scale(y, size))
}

/// Hands out sequential building ids.
struct IdSource(BuildingId);

impl IdSource {
    fn take(&mut self) -> Result<BuildingId, WorldError> {
        let id = self.0;
        self.0 = id.next().ok_or(WorldError::ArithmeticOverflow)?;
        Ok(id)
    }
}

/// Build the starting city for a grid of side `size`.
pub fn create_starting_city<R: Rng>(size: u32, rng: &mut R) -> Result<CityMap, WorldError> {
    let mut city = CityMap::new(size)?;
    let mut ids = IdSource(BuildingId(1));

    for cell in RESTRICTED {
        city.set_cell(scaled_pos(cell, size), CellKind::Restricted)?;
    }
    for cell in PARKS {
        city.set_cell(scaled_pos(cell, size), CellKind::Park)?;
    }

    for (building_type, anchor, power) in [
        (BuildingType::Hospital, HOSPITAL, HOSPITAL_POWER),
        (BuildingType::FireStation, FIRE_STATION, FIRE_STATION_POWER),
    ] {
        let pos = scaled_pos(anchor, size);
        if city.building_at(pos).is_some() {
            debug!(%pos, %building_type, "anchor cell taken, skipping");
            continue;
        }
        city.add_building(Building::new(ids.take()?, building_type, pos, power))?;
    }

    for zone in &ZONES {
        let (x0, x1) = (scale(zone.x.0, size), scale(zone.x.1, size).max(scale(zone.x.0, size)));
        let (y0, y1) = (scale(zone.y.0, size), scale(zone.y.1, size).max(scale(zone.y.0, size)));
        for _ in 0..zone.count {
            let spot = (0..PLACEMENT_ATTEMPTS).find_map(|_| {
                let pos = GridPos::new(rng.random_range(x0..=x1), rng.random_range(y0..=y1));
                (city.cell(pos) == Some(CellKind::Road) && !city.is_blocked(pos)).then_some(pos)
            });
            let Some(pos) = spot else {
                debug!(building_type = %zone.building_type, "no free cell in zone");
                continue;
            };
            let power = rng.random_range(zone.power.0..=zone.power.1);
            city.add_building(Building::new(ids.take()?, zone.building_type, pos, power))?;
        }
    }

    debug!(
        size,
        buildings = city.building_count(),
        "starting city created"
    );
    Ok(city)
}

/// Spawn the fleet: `normal` civilian vehicles on random drivable cells,
/// then `emergency` responders alternating ambulance (based at the
/// hospital) and fire truck (based at the fire station).
pub fn spawn_fleet<R: Rng>(
    city: &CityMap,
    normal: u32,
    emergency: u32,
    rng: &mut R,
) -> Result<Vec<Vehicle>, WorldError> {
    let mut vehicles = Vec::new();
    let mut next = VehicleId(1);
    let mut take_id = || -> Result<VehicleId, WorldError> {
        let id = next;
        next = id.next().ok_or(WorldError::ArithmeticOverflow)?;
        Ok(id)
    };

    for _ in 0..normal {
        let Some(pos) = city.random_drivable_cell(rng, PLACEMENT_ATTEMPTS) else {
            debug!("no drivable cell for civilian vehicle");
            continue;
        };
        let speed = f64::from(rng.random_range(40_u32..=60));
        let energy = f64::from(rng.random_range(70_u32..=100));
        vehicles.push(Vehicle::new(take_id()?, VehicleClass::Normal, pos, speed, energy));
    }

    for i in 0..emergency {
        let (class, base, speed) = if i % 2 == 0 {
            (VehicleClass::Ambulance, BuildingType::Hospital, 70.0)
        } else {
            (VehicleClass::FireTruck, BuildingType::FireStation, 65.0)
        };
        let home = match city.first_of_type(base) {
            Some(b) => Some(b.pos),
            None => city.random_drivable_cell(rng, PLACEMENT_ATTEMPTS),
        };
        let Some(home) = home else {
            debug!(%class, "no base cell for responder");
            continue;
        };
        let mut vehicle = Vehicle::new(take_id()?, class, home, speed, 100.0);
        vehicle.home = Some(home);
        vehicles.push(vehicle);
    }

    Ok(vehicles)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn reference_layout_on_default_grid() {
        let mut rng = StdRng::seed_from_u64(42);
        let city = create_starting_city(20, &mut rng).unwrap();
        let hospital = city.first_of_type(BuildingType::Hospital).unwrap();
        assert_eq!(hospital.pos, GridPos::new(5, 10));
        assert_eq!(hospital.power_requirement, 150);
        let station = city.first_of_type(BuildingType::FireStation).unwrap();
        assert_eq!(station.pos, GridPos::new(15, 10));
        assert_eq!(city.cell(GridPos::new(2, 2)), Some(CellKind::Restricted));
        assert_eq!(city.cell(GridPos::new(10, 5)), Some(CellKind::Park));
        assert_eq!(city.building_count(), 17);
    }

    #[test]
    fn zone_requirements_within_ranges() {
        let mut rng = StdRng::seed_from_u64(1);
        let city = create_starting_city(20, &mut rng).unwrap();
        for b in city.buildings() {
            let ok = match b.building_type {
                BuildingType::Residential => (30..=60).contains(&b.power_requirement),
                BuildingType::Commercial => (50..=100).contains(&b.power_requirement),
                BuildingType::Industrial => (100..=200).contains(&b.power_requirement),
                BuildingType::Hospital => b.power_requirement == 150,
                BuildingType::FireStation => b.power_requirement == 100,
            };
            assert!(ok, "{b:?}");
        }
    }

    #[test]
    fn same_seed_same_city() {
        let a = create_starting_city(20, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = create_starting_city(20, &mut StdRng::seed_from_u64(9)).unwrap();
        let pa: Vec<_> = a.buildings().map(|b| (b.pos, b.power_requirement)).collect();
        let pb: Vec<_> = b.buildings().map(|b| (b.pos, b.power_requirement)).collect();
        assert_eq!(pa, pb);
    }

    #[test]
    fn small_grid_still_builds() {
        let mut rng = StdRng::seed_from_u64(3);
        let city = create_starting_city(5, &mut rng).unwrap();
        assert!(city.first_of_type(BuildingType::Hospital).is_some());
    }

    #[test]
    fn fleet_alternates_responders() {
        let mut rng = StdRng::seed_from_u64(42);
        let city = create_starting_city(20, &mut rng).unwrap();
        let fleet = spawn_fleet(&city, 8, 2, &mut rng).unwrap();
        assert_eq!(fleet.len(), 10);
        let responders: Vec<_> = fleet.iter().filter(|v| v.is_emergency()).collect();
        assert_eq!(responders.len(), 2);
        assert_eq!(responders[0].class, VehicleClass::Ambulance);
        assert_eq!(responders[0].pos, GridPos::new(5, 10));
        assert_eq!(responders[1].class, VehicleClass::FireTruck);
        assert_eq!(responders[1].home, Some(GridPos::new(15, 10)));
        for v in fleet.iter().filter(|v| !v.is_emergency()) {
            assert!(city.is_drivable(v.pos));
            assert!((70.0..=100.0).contains(&v.energy));
        }
    }
}
