//! Aggregate metrics.

use nexus_reasoning::allocation::percent;
use nexus_types::Metrics;

use crate::state::CityState;
use crate::tick::Engines;

/// Weight of the emergency resolution rate in the efficiency score.
pub const RESOLUTION_WEIGHT: f64 = 0.7;

/// Weight of power utilization in the efficiency score.
pub const UTILIZATION_WEIGHT: f64 = 0.3;

/// `0.7 x resolution rate + 0.3 x min(utilization, 100)`, or 100 before
/// any emergency has been reported.
pub fn efficiency_score(resolved: u64, total: u64, utilization: f64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let resolution = percent(resolved, total);
    RESOLUTION_WEIGHT.mul_add(resolution, UTILIZATION_WEIGHT * utilization.clamp(0.0, 100.0))
}

/// Collect metrics from the current state.
pub fn collect(state: &CityState, engines: &Engines, capacity: u32) -> Metrics {
    let open = u64::try_from(state.open_emergencies().count()).unwrap_or(u64::MAX);
    let resolved = state.resolved_emergencies();
    let total = open.saturating_add(resolved);
    let utilization = percent(state.city.total_allocated(), u64::from(capacity));

    Metrics {
        tick: state.tick,
        efficiency_score: efficiency_score(resolved, total, utilization),
        total_vehicles: u32::try_from(state.vehicles.len()).unwrap_or(u32::MAX),
        moving_vehicles: state.moving_vehicles(),
        emergency_vehicles: state.emergency_vehicles(),
        total_emergencies: narrow(total),
        open_emergencies: narrow(open),
        resolved_emergencies: narrow(resolved),
        power_utilization: utilization,
        weather: state.city.weather(),
        routing: engines.router.stats(),
        reasoning_counts: engines.explainer.counts(),
    }
}

fn narrow(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_emergencies_scores_full() {
        assert!((efficiency_score(0, 0, 12.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weighted_score() {
        // 1 of 2 resolved (50%), 80% utilization: 35 + 24.
        assert!((efficiency_score(1, 2, 80.0) - 59.0).abs() < 1e-9);
        // Utilization is capped at 100.
        assert!((efficiency_score(2, 2, 150.0) - 100.0).abs() < 1e-9);
    }
}
