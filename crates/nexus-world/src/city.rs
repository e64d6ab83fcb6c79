//! The city grid: cells, buildings, closures and weather.
//!
//! [`CityMap`] is pure data plus accessors. Cells are stored row-major;
//! buildings and closures live in ordered maps so that every iteration
//! is deterministic.

use std::collections::BTreeMap;

use nexus_types::{BlockedSegment, Building, BuildingId, BuildingType, CellKind, GridPos, Weather};
use rand::Rng;

use crate::error::WorldError;

/// A square grid city.
#[derive(Debug, Clone)]
pub struct CityMap {
    size: u32,
    cells: Vec<CellKind>,
    buildings: BTreeMap<BuildingId, Building>,
    building_at: BTreeMap<GridPos, BuildingId>,
    blocked: BTreeMap<GridPos, BlockedSegment>,
    weather: Weather,
}

impl CityMap {
    /// Create a `size` x `size` grid of plain road in clear weather.
    pub fn new(size: u32) -> Result<Self, WorldError> {
        if size < 2 {
            return Err(WorldError::GridTooSmall(size));
        }
        let side = usize::try_from(size).map_err(|_e| WorldError::ArithmeticOverflow)?;
        let area = side
            .checked_mul(side)
            .ok_or(WorldError::ArithmeticOverflow)?;
        Ok(Self {
            size,
            cells: vec![CellKind::Road; area],
            buildings: BTreeMap::new(),
            building_at: BTreeMap::new(),
            blocked: BTreeMap::new(),
            weather: Weather::Clear,
        })
    }

    /// Side length of the grid.
    pub const fn size(&self) -> u32 {
        self.size
    }

    // -------------------------------------------------------------------
    // Weather
    // -------------------------------------------------------------------

    /// Current weather.
    pub const fn weather(&self) -> Weather {
        self.weather
    }

    /// Set the weather. Returns `true` if it changed.
    pub fn set_weather(&mut self, weather: Weather) -> bool {
        let changed = self.weather != weather;
        self.weather = weather;
        changed
    }

    // -------------------------------------------------------------------
    // Cells
    // -------------------------------------------------------------------

    /// Whether `pos` lies inside the grid.
    pub const fn contains(&self, pos: GridPos) -> bool {
        pos.x < self.size && pos.y < self.size
    }

    /// Return an error unless `pos` lies inside the grid.
    pub const fn check_bounds(&self, pos: GridPos) -> Result<(), WorldError> {
        if self.contains(pos) {
            Ok(())
        } else {
            Err(WorldError::OutOfBounds {
                pos,
                grid_size: self.size,
            })
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        if !self.contains(pos) {
            return None;
        }
        let row = usize::try_from(pos.y).ok()?;
        let col = usize::try_from(pos.x).ok()?;
        let side = usize::try_from(self.size).ok()?;
        row.checked_mul(side)?.checked_add(col)
    }

    /// Kind of the cell at `pos`, or `None` outside the grid.
    pub fn cell(&self, pos: GridPos) -> Option<CellKind> {
        self.index(pos).and_then(|i| self.cells.get(i).copied())
    }

    /// Overwrite the kind of the cell at `pos`.
    pub fn set_cell(&mut self, pos: GridPos, kind: CellKind) -> Result<(), WorldError> {
        let grid_size = self.size;
        let slot = self
            .index(pos)
            .and_then(|i| self.cells.get_mut(i))
            .ok_or(WorldError::OutOfBounds { pos, grid_size })?;
        *slot = kind;
        Ok(())
    }

    /// Whether `pos` is currently closed.
    pub fn is_blocked(&self, pos: GridPos) -> bool {
        self.blocked.contains_key(&pos)
    }

    /// Whether a vehicle may drive through `pos` right now.
    pub fn is_drivable(&self, pos: GridPos) -> bool {
        self.cell(pos).is_some_and(CellKind::is_drivable) && !self.is_blocked(pos)
    }

    /// In-bounds 4-connected neighbours of `pos`, in a fixed order
    /// (east, south, west, north). No passability filtering.
    pub fn neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        let mut out = Vec::with_capacity(4);
        if let Some(x) = pos.x.checked_add(1) {
            out.push(GridPos::new(x, pos.y));
        }
        if let Some(y) = pos.y.checked_add(1) {
            out.push(GridPos::new(pos.x, y));
        }
        if let Some(x) = pos.x.checked_sub(1) {
            out.push(GridPos::new(x, pos.y));
        }
        if let Some(y) = pos.y.checked_sub(1) {
            out.push(GridPos::new(pos.x, y));
        }
        out.retain(|p| self.contains(*p));
        out
    }

    /// Every drivable, unblocked cell in row-major order.
    pub fn drivable_cells(&self) -> Vec<GridPos> {
        (0..self.size)
            .flat_map(|y| (0..self.size).map(move |x| GridPos::new(x, y)))
            .filter(|p| self.is_drivable(*p))
            .collect()
    }

    /// Pick a random drivable cell, giving up after `attempts` draws.
    pub fn random_drivable_cell<R: Rng>(
        &self,
        rng: &mut R,
        attempts: u32,
    ) -> Option<GridPos> {
        (0..attempts).find_map(|_| {
            let pos = GridPos::new(rng.random_range(0..self.size), rng.random_range(0..self.size));
            self.is_drivable(pos).then_some(pos)
        })
    }

    // -------------------------------------------------------------------
    // Buildings
    // -------------------------------------------------------------------

    /// Place a building. Its cell becomes [`CellKind::Building`].
    pub fn add_building(&mut self, building: Building) -> Result<(), WorldError> {
        self.check_bounds(building.pos)?;
        if self.buildings.contains_key(&building.id) {
            return Err(WorldError::DuplicateBuilding(building.id));
        }
        if self.building_at.contains_key(&building.pos) {
            return Err(WorldError::CellOccupied(building.pos));
        }
        self.set_cell(building.pos, CellKind::Building)?;
        self.blocked.remove(&building.pos);
        self.building_at.insert(building.pos, building.id);
        self.buildings.insert(building.id, building);
        Ok(())
    }

    /// Look up a building by id.
    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    /// The building standing at `pos`, if any.
    pub fn building_at(&self, pos: GridPos) -> Option<&Building> {
        self.building_at
            .get(&pos)
            .and_then(|id| self.buildings.get(id))
    }

    /// The lowest-id building of the given type.
    pub fn first_of_type(&self, building_type: BuildingType) -> Option<&Building> {
        self.buildings
            .values()
            .find(|b| b.building_type == building_type)
    }

    /// All buildings in id order.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    /// Number of buildings.
    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }

    /// Set the power granted to one building, clamped to its requirement.
    pub fn set_allocation(&mut self, id: BuildingId, units: u32) -> Result<(), WorldError> {
        let building = self
            .buildings
            .get_mut(&id)
            .ok_or(WorldError::BuildingNotFound(id))?;
        building.allocated_power = units.min(building.power_requirement);
        Ok(())
    }

    /// Sum of all power requirements.
    pub fn total_demand(&self) -> u64 {
        self.buildings
            .values()
            .map(|b| u64::from(b.power_requirement))
            .fold(0, u64::saturating_add)
    }

    /// Sum of all granted power.
    pub fn total_allocated(&self) -> u64 {
        self.buildings
            .values()
            .map(|b| u64::from(b.allocated_power))
            .fold(0, u64::saturating_add)
    }

    // -------------------------------------------------------------------
    // Closures
    // -------------------------------------------------------------------

    /// Close a drivable cell. Returns `false` if it was already closed.
    pub fn block(
        &mut self,
        pos: GridPos,
        reason: impl Into<String>,
        since_tick: u64,
        until_tick: Option<u64>,
    ) -> Result<bool, WorldError> {
        self.check_bounds(pos)?;
        if !self.cell(pos).is_some_and(CellKind::is_drivable) {
            return Err(WorldError::NotARoad(pos));
        }
        if self.blocked.contains_key(&pos) {
            return Ok(false);
        }
        self.blocked.insert(
            pos,
            BlockedSegment {
                pos,
                reason: reason.into(),
                since_tick,
                until_tick,
            },
        );
        Ok(true)
    }

    /// Reopen a cell. Returns the lifted closure, if there was one.
    pub fn unblock(&mut self, pos: GridPos) -> Option<BlockedSegment> {
        self.blocked.remove(&pos)
    }

    /// Lift every timed closure whose expiry is at or before `tick`.
    pub fn expire_blockages(&mut self, tick: u64) -> Vec<BlockedSegment> {
        let expired: Vec<GridPos> = self
            .blocked
            .values()
            .filter(|s| s.until_tick.is_some_and(|until| until <= tick))
            .map(|s| s.pos)
            .collect();
        expired
            .into_iter()
            .filter_map(|pos| self.blocked.remove(&pos))
            .collect()
    }

    /// All current closures in position order.
    pub fn blocked_segments(&self) -> impl Iterator<Item = &BlockedSegment> {
        self.blocked.values()
    }

    /// Remove every closure.
    pub fn clear_blockages(&mut self) {
        self.blocked.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rejects_tiny_grid() {
        assert_eq!(CityMap::new(1).unwrap_err(), WorldError::GridTooSmall(1));
    }

    #[test]
    fn neighbors_stay_in_bounds() {
        let city = CityMap::new(3).unwrap();
        assert_eq!(city.neighbors(GridPos::new(0, 0)).len(), 2);
        assert_eq!(city.neighbors(GridPos::new(1, 1)).len(), 4);
        assert_eq!(city.neighbors(GridPos::new(2, 2)).len(), 2);
    }

    #[test]
    fn building_occupies_cell() {
        let mut city = CityMap::new(4).unwrap();
        let b = Building::new(BuildingId(1), BuildingType::Hospital, GridPos::new(1, 1), 150);
        city.add_building(b.clone()).unwrap();
        assert_eq!(city.cell(GridPos::new(1, 1)), Some(CellKind::Building));
        assert!(!city.is_drivable(GridPos::new(1, 1)));
        assert_eq!(city.building_at(GridPos::new(1, 1)).map(|b| b.id), Some(BuildingId(1)));

        let clash = Building::new(BuildingId(2), BuildingType::Residential, GridPos::new(1, 1), 30);
        assert_eq!(
            city.add_building(clash).unwrap_err(),
            WorldError::CellOccupied(GridPos::new(1, 1))
        );
    }

    #[test]
    fn allocation_is_clamped_to_requirement() {
        let mut city = CityMap::new(4).unwrap();
        city.add_building(Building::new(BuildingId(1), BuildingType::Industrial, GridPos::new(0, 0), 100))
            .unwrap();
        city.set_allocation(BuildingId(1), 250).unwrap();
        assert_eq!(city.building(BuildingId(1)).unwrap().allocated_power, 100);
        assert!(city.set_allocation(BuildingId(9), 1).is_err());
    }

    #[test]
    fn block_and_expire() {
        let mut city = CityMap::new(5).unwrap();
        let pos = GridPos::new(2, 2);
        assert!(city.block(pos, "accident", 0, Some(10)).unwrap());
        assert!(!city.block(pos, "again", 1, None).unwrap());
        assert!(!city.is_drivable(pos));
        assert!(city.expire_blockages(9).is_empty());
        let lifted = city.expire_blockages(10);
        assert_eq!(lifted.len(), 1);
        assert!(city.is_drivable(pos));
    }

    #[test]
    fn manual_block_never_expires() {
        let mut city = CityMap::new(5).unwrap();
        city.block(GridPos::new(1, 0), "works", 0, None).unwrap();
        assert!(city.expire_blockages(u64::MAX).is_empty());
        assert!(city.unblock(GridPos::new(1, 0)).is_some());
    }

    #[test]
    fn cannot_block_out_of_bounds_or_restricted() {
        let mut city = CityMap::new(3).unwrap();
        assert!(city.block(GridPos::new(5, 0), "x", 0, None).is_err());
        city.set_cell(GridPos::new(1, 1), CellKind::Restricted).unwrap();
        assert_eq!(
            city.block(GridPos::new(1, 1), "x", 0, None).unwrap_err(),
            WorldError::NotARoad(GridPos::new(1, 1))
        );
    }

    #[test]
    fn random_cell_is_drivable() {
        let mut city = CityMap::new(4).unwrap();
        city.set_cell(GridPos::new(0, 0), CellKind::Restricted).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let pos = city.random_drivable_cell(&mut rng, 50).unwrap();
            assert!(city.is_drivable(pos));
        }
    }

    #[test]
    fn weather_change_reports_difference() {
        let mut city = CityMap::new(2).unwrap();
        assert!(!city.set_weather(Weather::Clear));
        assert!(city.set_weather(Weather::Snow));
        assert_eq!(city.weather(), Weather::Snow);
    }
}
