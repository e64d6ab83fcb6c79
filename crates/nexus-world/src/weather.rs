//! Weather effect tables.
//!
//! Weather itself is plain state on the city map and only changes by
//! command. This module maps it to the multipliers the engines consume.
//! Routing costs are kept in integer tenths so that A* and Dijkstra
//! compare exact totals.

use nexus_types::Weather;

/// Cost of one grid step in clear weather, in tenths of a unit.
pub const BASE_STEP_COST: u32 = 10;

/// Edge cost of one grid step under `weather`, in tenths of a unit
/// (clear 1.0, rain 1.5, snow 2.0).
pub const fn step_cost_tenths(weather: Weather) -> u32 {
    match weather {
        Weather::Clear => 10,
        Weather::Rain => 15,
        Weather::Snow => 20,
    }
}

/// Edge-cost multiplier for routing.
pub fn routing_multiplier(weather: Weather) -> f64 {
    f64::from(step_cost_tenths(weather)) / f64::from(BASE_STEP_COST)
}

/// Accident likelihood multiplier.
pub const fn accident_multiplier(weather: Weather) -> f64 {
    match weather {
        Weather::Clear => 1.0,
        Weather::Rain => 2.5,
        Weather::Snow => 3.0,
    }
}

/// Fire likelihood multiplier. Wet weather suppresses fires.
pub const fn fire_multiplier(weather: Weather) -> f64 {
    match weather {
        Weather::Clear => 1.2,
        Weather::Rain => 0.3,
        Weather::Snow => 0.5,
    }
}

/// Vehicle health lost per cell driven.
pub const fn health_wear_per_cell(weather: Weather) -> f64 {
    match weather {
        Weather::Clear => 0.0,
        Weather::Rain => 0.02,
        Weather::Snow => 0.05,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_multipliers() {
        assert!((routing_multiplier(Weather::Clear) - 1.0).abs() < f64::EPSILON);
        assert!((routing_multiplier(Weather::Rain) - 1.5).abs() < f64::EPSILON);
        assert!((routing_multiplier(Weather::Snow) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_costs_never_below_base() {
        for w in Weather::ALL {
            assert!(step_cost_tenths(w) >= BASE_STEP_COST);
        }
    }

    #[test]
    fn rain_suppresses_fire_but_raises_accidents() {
        assert!(fire_multiplier(Weather::Rain) < fire_multiplier(Weather::Clear));
        assert!(accident_multiplier(Weather::Rain) > accident_multiplier(Weather::Clear));
    }
}
