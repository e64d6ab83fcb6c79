//! Constraint-based power allocation.
//!
//! Three ordered phases over a finite integer power budget:
//!
//! 1. Every CRITICAL building gets 80% of its requirement (rounded down),
//!    in ascending id order, until capacity runs out.
//! 2. Every HIGH building gets 50% of its requirement (rounded down) from
//!    what remains, same order.
//!
//! Floors round down so that their sum never exceeds the sum of the exact
//! fractional shares: whenever capacity covers the exact shares, every
//! building reaches its whole-unit floor. Sub-unit remainders are settled
//! in phase 3.
//! 3. The rest is split across all buildings in proportion to their
//!    unmet demand. Whole units left over after flooring go to the
//!    largest fractional shares, ties by ascending id.
//!
//! Allocation never fails. Under scarcity it degrades to the priority
//! floors (or part of them) and reports the shortfall.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use nexus_types::{Building, BuildingId, EngineId, Event, EventType, PriorityClass, Severity};
use nexus_world::CityMap;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::output::{EngineOutput, ReasoningContext};

/// One building's demand as seen by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    /// Building id, the tie-break key.
    pub id: BuildingId,
    /// Requested units.
    pub requirement: u32,
    /// Priority tier.
    pub priority: PriorityClass,
}

impl From<&Building> for Demand {
    fn from(b: &Building) -> Self {
        Self {
            id: b.id,
            requirement: b.power_requirement,
            priority: b.priority,
        }
    }
}

/// Guaranteed share for a CRITICAL building: 80%, rounded down.
#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
pub const fn critical_floor(requirement: u32) -> u32 {
    let scaled = (requirement as u64).saturating_mul(4) / 5;
    if scaled > u32::MAX as u64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Guaranteed share for a HIGH building: 50%, rounded down.
pub const fn high_floor(requirement: u32) -> u32 {
    requirement / 2
}

/// The floor a building is entitled to in phases 1 and 2.
pub const fn floor_for(demand: &Demand) -> u32 {
    match demand.priority {
        PriorityClass::Critical => critical_floor(demand.requirement),
        PriorityClass::High => high_floor(demand.requirement),
        PriorityClass::Normal => 0,
    }
}

/// A broken allocation constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Total allocation exceeds capacity.
    OverCapacity {
        /// Units handed out.
        allocated: u64,
        /// Units available.
        capacity: u32,
    },
    /// A building received more than it asked for.
    OverRequirement {
        /// The building.
        building: BuildingId,
        /// Units granted.
        allocated: u32,
        /// Units requested.
        requirement: u32,
    },
    /// A prioritized building is below its floor.
    BelowFloor {
        /// The building.
        building: BuildingId,
        /// Its tier.
        priority: PriorityClass,
        /// Units granted.
        allocated: u32,
        /// Units guaranteed when capacity allows.
        floor: u32,
    },
}

impl Violation {
    /// Hard violations can never be produced by a correct allocator;
    /// floor shortfalls are the expected degraded mode.
    pub const fn is_hard(&self) -> bool {
        !matches!(self, Self::BelowFloor { .. })
    }
}

/// Result of one allocation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Units granted per building.
    pub grants: BTreeMap<BuildingId, u32>,
    /// Units handed out by each phase.
    pub phase_totals: [u64; 3],
    /// Total units granted.
    pub total_allocated: u64,
    /// Total units requested.
    pub total_demand: u64,
    /// Capacity the run was given.
    pub capacity: u32,
    /// Constraint check of the result.
    pub violations: Vec<Violation>,
}

impl Allocation {
    /// Whether every CRITICAL building reached its floor.
    pub fn critical_satisfied(&self) -> bool {
        !self.violations.iter().any(|v| {
            matches!(
                v,
                Violation::BelowFloor {
                    priority: PriorityClass::Critical,
                    ..
                }
            )
        })
    }

    /// Whether every HIGH building reached its floor.
    pub fn high_satisfied(&self) -> bool {
        !self.violations.iter().any(|v| {
            matches!(
                v,
                Violation::BelowFloor {
                    priority: PriorityClass::High,
                    ..
                }
            )
        })
    }

    /// Granted units as a percentage of capacity, in `[0, 100]`.
    pub fn utilization_percent(&self) -> f64 {
        percent(self.total_allocated, u64::from(self.capacity))
    }
}

/// `part / whole` as a percentage clamped to `[0, 100]`.
#[allow(clippy::cast_precision_loss)]
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

/// Give `want` units from `remaining`, partially if it runs out.
fn grant(remaining: &mut u64, want: u64) -> u64 {
    let given = want.min(*remaining);
    *remaining = remaining.saturating_sub(given);
    given
}

/// Run the three-phase allocation.
pub fn allocate(capacity: u32, demands: &[Demand]) -> Allocation {
    let mut ordered: Vec<Demand> = demands.to_vec();
    ordered.sort_by_key(|d| d.id);

    let mut granted: BTreeMap<BuildingId, u64> = ordered.iter().map(|d| (d.id, 0)).collect();
    let mut remaining = u64::from(capacity);
    let mut phase_totals = [0_u64; 3];

    for (phase, tier) in [PriorityClass::Critical, PriorityClass::High]
        .into_iter()
        .enumerate()
    {
        let mut phase_total: u64 = 0;
        for d in ordered.iter().filter(|d| d.priority == tier) {
            let given = grant(&mut remaining, u64::from(floor_for(d)));
            if let Some(slot) = granted.get_mut(&d.id) {
                *slot = slot.saturating_add(given);
            }
            phase_total = phase_total.saturating_add(given);
        }
        if let Some(slot) = phase_totals.get_mut(phase) {
            *slot = phase_total;
        }
    }

    let unmet: Vec<(BuildingId, u64)> = ordered
        .iter()
        .map(|d| {
            let have = granted.get(&d.id).copied().unwrap_or(0);
            (d.id, u64::from(d.requirement).saturating_sub(have))
        })
        .filter(|(_, u)| *u > 0)
        .collect();
    let total_unmet = unmet.iter().map(|(_, u)| *u).fold(0_u64, u64::saturating_add);

    let mut proportional: BTreeMap<BuildingId, u64> = BTreeMap::new();
    if remaining >= total_unmet {
        proportional.extend(unmet.iter().copied());
    } else if total_unmet > 0 {
        let mut fractions: Vec<(u64, BuildingId)> = Vec::with_capacity(unmet.len());
        let mut handed: u64 = 0;
        for &(id, u) in &unmet {
            let numerator = remaining.saturating_mul(u);
            let share = numerator.checked_div(total_unmet).unwrap_or(0);
            let fraction = numerator.checked_rem(total_unmet).unwrap_or(0);
            handed = handed.saturating_add(share);
            proportional.insert(id, share);
            fractions.push((fraction, id));
        }
        let leftover = remaining.saturating_sub(handed);
        fractions.sort_by_key(|&(fraction, id)| (Reverse(fraction), id));
        for &(_, id) in fractions
            .iter()
            .filter(|(fraction, _)| *fraction > 0)
            .take(usize::try_from(leftover).unwrap_or(usize::MAX))
        {
            if let Some(slot) = proportional.get_mut(&id) {
                *slot = slot.saturating_add(1);
            }
        }
    }
    for (id, extra) in &proportional {
        if let Some(slot) = granted.get_mut(id) {
            *slot = slot.saturating_add(*extra);
        }
        if let Some(slot) = phase_totals.get_mut(2) {
            *slot = slot.saturating_add(*extra);
        }
    }

    let grants: BTreeMap<BuildingId, u32> = granted
        .into_iter()
        .map(|(id, units)| (id, u32::try_from(units).unwrap_or(u32::MAX)))
        .collect();
    let total_allocated = grants.values().map(|&u| u64::from(u)).fold(0, u64::saturating_add);
    let total_demand = ordered
        .iter()
        .map(|d| u64::from(d.requirement))
        .fold(0, u64::saturating_add);
    let violations = check_constraints(capacity, &ordered, &grants);

    Allocation {
        grants,
        phase_totals,
        total_allocated,
        total_demand,
        capacity,
        violations,
    }
}

/// Check an allocation against every constraint.
pub fn check_constraints(
    capacity: u32,
    demands: &[Demand],
    grants: &BTreeMap<BuildingId, u32>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let allocated = grants.values().map(|&u| u64::from(u)).fold(0, u64::saturating_add);
    if allocated > u64::from(capacity) {
        violations.push(Violation::OverCapacity {
            allocated,
            capacity,
        });
    }
    for d in demands {
        let given = grants.get(&d.id).copied().unwrap_or(0);
        if given > d.requirement {
            violations.push(Violation::OverRequirement {
                building: d.id,
                allocated: given,
                requirement: d.requirement,
            });
        }
        let floor = floor_for(d);
        if given < floor {
            violations.push(Violation::BelowFloor {
                building: d.id,
                priority: d.priority,
                allocated: given,
                floor,
            });
        }
    }
    violations
}

/// Reallocate power across the city and apply the result.
pub fn reallocate(city: &mut CityMap, capacity: u32, tick: u64) -> Result<EngineOutput, EngineError> {
    let demands: Vec<Demand> = city.buildings().map(Demand::from).collect();
    let allocation = allocate(capacity, &demands);

    if let Some(hard) = allocation.violations.iter().find(|v| v.is_hard()) {
        return Err(EngineError::Invariant {
            engine: EngineId::Allocation,
            detail: format!("{hard:?}"),
        });
    }
    for (&id, &units) in &allocation.grants {
        city.set_allocation(id, units)?;
    }

    let degraded = !(allocation.critical_satisfied() && allocation.high_satisfied());
    let utilization = allocation.utilization_percent();
    let [p1, p2, p3] = allocation.phase_totals;
    let mut out = EngineOutput::new();

    let (event_type, severity, description) = if degraded {
        warn!(
            tick,
            capacity,
            demand = allocation.total_demand,
            "power below priority floors, running in reduced-efficiency mode"
        );
        (
            EventType::PowerShortage,
            Severity::Warning,
            format!(
                "Power shortage: {} units demanded against {} available, priority floors not met",
                allocation.total_demand, capacity
            ),
        )
    } else {
        debug!(tick, allocated = allocation.total_allocated, "power reallocated");
        (
            EventType::PowerAllocated,
            Severity::Info,
            format!(
                "Allocated {} of {} units across {} buildings ({utilization:.1}% utilization)",
                allocation.total_allocated,
                capacity,
                allocation.grants.len()
            ),
        )
    };
    out.event(Event::new(
        tick,
        event_type,
        severity,
        description,
        json!({
            "capacity": capacity,
            "total_allocated": allocation.total_allocated,
            "total_demand": allocation.total_demand,
            "utilization_percent": utilization,
            "critical_satisfied": allocation.critical_satisfied(),
            "high_satisfied": allocation.high_satisfied(),
        }),
    ));

    let shortfalls: Vec<String> = allocation
        .violations
        .iter()
        .filter_map(|v| match v {
            Violation::BelowFloor {
                building,
                allocated,
                floor,
                ..
            } => Some(format!("{building} got {allocated} of floor {floor}")),
            _ => None,
        })
        .collect();
    let grants_by_name: BTreeMap<String, u32> = allocation
        .grants
        .iter()
        .map(|(id, u)| (id.to_string(), *u))
        .collect();
    let mut context = ReasoningContext::new(
        EngineId::Allocation,
        if degraded { "degraded_allocation" } else { "allocation_complete" },
    )
    .step(format!("phase 1 granted {p1} units to CRITICAL buildings"))
    .step(format!("phase 2 granted {p2} units to HIGH buildings"))
    .step(format!("phase 3 distributed {p3} units by unmet demand"))
    .inputs(json!({ "capacity": capacity, "buildings": demands.len(), "total_demand": allocation.total_demand }))
    .outputs(json!({
        "grants": grants_by_name,
        "shortfalls": shortfalls,
    }))
    .confidence(if degraded { 0.7 } else { 1.0 });
    for s in &shortfalls {
        context = context.step(format!("shortfall: {s}"));
    }
    out.reason(context);
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use nexus_types::{BuildingType, GridPos};

    use super::*;

    fn demand(id: u32, requirement: u32, priority: PriorityClass) -> Demand {
        Demand {
            id: BuildingId(id),
            requirement,
            priority,
        }
    }

    fn total(a: &Allocation) -> u64 {
        a.grants.values().map(|&u| u64::from(u)).sum()
    }

    #[test]
    fn three_building_scenario() {
        let demands = [
            demand(1, 80, PriorityClass::Critical),
            demand(2, 60, PriorityClass::High),
            demand(3, 40, PriorityClass::Normal),
        ];
        let a = allocate(100, &demands);
        assert_eq!(a.phase_totals, [64, 30, 6]);
        assert_eq!(a.grants[&BuildingId(1)], 65);
        assert_eq!(a.grants[&BuildingId(2)], 32);
        assert_eq!(a.grants[&BuildingId(3)], 3);
        assert_eq!(total(&a), 100);
        assert!(a.critical_satisfied());
        assert!(a.high_satisfied());
    }

    #[test]
    fn abundance_satisfies_everyone() {
        let demands = [
            demand(1, 150, PriorityClass::Critical),
            demand(2, 100, PriorityClass::High),
            demand(3, 45, PriorityClass::Normal),
        ];
        let a = allocate(1000, &demands);
        assert_eq!(a.grants[&BuildingId(1)], 150);
        assert_eq!(a.grants[&BuildingId(2)], 100);
        assert_eq!(a.grants[&BuildingId(3)], 45);
        assert!(a.violations.is_empty());
    }

    #[test]
    fn scarcity_partially_serves_critical_in_id_order() {
        let demands = [
            demand(2, 100, PriorityClass::Critical),
            demand(1, 100, PriorityClass::Critical),
            demand(3, 100, PriorityClass::High),
        ];
        let a = allocate(100, &demands);
        assert_eq!(a.grants[&BuildingId(1)], 80);
        assert_eq!(a.grants[&BuildingId(2)], 20);
        assert_eq!(a.grants[&BuildingId(3)], 0);
        assert!(!a.critical_satisfied());
        assert!(a.violations.iter().all(|v| !v.is_hard()));
    }

    #[test]
    fn zero_capacity_grants_nothing() {
        let a = allocate(0, &[demand(1, 50, PriorityClass::Critical)]);
        assert_eq!(a.grants[&BuildingId(1)], 0);
        assert_eq!(a.total_allocated, 0);
    }

    #[test]
    fn invariants_hold_over_many_capacities() {
        let demands = [
            demand(1, 150, PriorityClass::Critical),
            demand(2, 100, PriorityClass::Critical),
            demand(3, 170, PriorityClass::High),
            demand(4, 73, PriorityClass::High),
            demand(5, 41, PriorityClass::Normal),
            demand(6, 59, PriorityClass::Normal),
        ];
        let floors: u64 = demands.iter().map(|d| u64::from(floor_for(d))).sum();
        for capacity in (0..700).step_by(7) {
            let a = allocate(capacity, &demands);
            assert!(total(&a) <= u64::from(capacity));
            for d in &demands {
                assert!(a.grants[&d.id] <= d.requirement);
            }
            assert!(a.violations.iter().all(|v| !v.is_hard()));
            if u64::from(capacity) >= floors {
                assert!(a.critical_satisfied(), "capacity {capacity}");
                assert!(a.high_satisfied(), "capacity {capacity}");
                let demand_total: u64 = demands.iter().map(|d| u64::from(d.requirement)).sum();
                assert_eq!(total(&a), u64::from(capacity).min(demand_total));
            }
        }
    }

    #[test]
    fn floors_round_down() {
        assert_eq!(critical_floor(80), 64);
        assert_eq!(critical_floor(81), 64);
        assert_eq!(high_floor(61), 30);
    }

    #[test]
    fn exact_capacity_contention_meets_every_floor() {
        // Exact shares are 30.5 + 30.5 = 61.
        let demands = [
            demand(1, 61, PriorityClass::High),
            demand(2, 61, PriorityClass::High),
        ];
        let a = allocate(61, &demands);
        assert_eq!(a.phase_totals, [0, 60, 1]);
        assert_eq!(a.grants[&BuildingId(1)], 31);
        assert_eq!(a.grants[&BuildingId(2)], 30);
        assert!(a.high_satisfied());
        assert!(a.violations.is_empty());
    }

    #[test]
    fn check_constraints_flags_hard_violations() {
        let demands = [demand(1, 10, PriorityClass::Normal)];
        let grants = BTreeMap::from([(BuildingId(1), 20)]);
        let v = check_constraints(15, &demands, &grants);
        assert!(v.iter().any(|v| matches!(v, Violation::OverCapacity { .. })));
        assert!(v.iter().any(|v| matches!(v, Violation::OverRequirement { .. })));
    }

    #[test]
    fn reallocate_updates_city_and_reports() {
        let mut city = CityMap::new(5).unwrap();
        city.add_building(Building::new(BuildingId(1), BuildingType::Hospital, GridPos::new(0, 0), 80))
            .unwrap();
        city.add_building(Building::new(BuildingId(2), BuildingType::Industrial, GridPos::new(1, 0), 60))
            .unwrap();
        city.add_building(Building::new(BuildingId(3), BuildingType::Residential, GridPos::new(2, 0), 40))
            .unwrap();
        let out = reallocate(&mut city, 100, 20).unwrap();
        assert_eq!(city.total_allocated(), 100);
        assert_eq!(city.building(BuildingId(1)).unwrap().allocated_power, 65);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].event_type, EventType::PowerAllocated);
        assert_eq!(out.reasoning[0].confidence, Some(1.0));

        let out = reallocate(&mut city, 50, 40).unwrap();
        assert_eq!(out.events[0].event_type, EventType::PowerShortage);
        assert_eq!(out.reasoning[0].decision, "degraded_allocation");
        assert!(city.total_allocated() <= 50);
    }
}
