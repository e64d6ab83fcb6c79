//! Probabilistic emergency generator.
//!
//! Each tick the generator computes
//!
//! ```text
//! P(accident) = base × weather × rush_hour × traffic      (capped)
//! P(fire)     = base × weather × building_density         (capped)
//! ```
//!
//! from fixed factor tables, draws once per kind from its own seeded
//! generator, and spawns when the draw is strictly below the probability.
//! The assessment functions are pure; only [`EventGenerator`] holds
//! randomness.

use nexus_types::{EmergencyKind, EngineId, Weather};
use nexus_world::weather;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::output::ReasoningContext;

/// Period of the simulated day in ticks.
pub const DAY_TICKS: u64 = 1000;

/// Morning and evening rush windows within a day, inclusive.
pub const RUSH_WINDOWS: [(u64, u64); 2] = [(200, 300), (600, 700)];

/// Whether `tick` falls inside a rush-hour window.
pub fn is_rush_hour(tick: u64) -> bool {
    let t = tick.checked_rem(DAY_TICKS).unwrap_or(0);
    RUSH_WINDOWS
        .iter()
        .any(|&(start, end)| (start..=end).contains(&t))
}

/// Rush-hour multiplier.
pub const fn rush_hour_multiplier(rush: bool) -> f64 {
    if rush { 2.0 } else { 1.0 }
}

/// Traffic level derived from the number of moving vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    /// Fewer than 3 moving vehicles.
    Low,
    /// 3 to 5 moving vehicles.
    Medium,
    /// More than 5 moving vehicles.
    High,
}

impl TrafficLevel {
    /// Classify a moving-vehicle count.
    pub const fn from_moving(moving: u32) -> Self {
        match moving {
            0..=2 => Self::Low,
            3..=5 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Accident multiplier for this level.
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 1.0,
            Self::High => 1.8,
        }
    }

    /// Wire name of this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Building density derived from the building count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingDensity {
    /// Fewer than 10 buildings.
    Low,
    /// 10 to 20 buildings.
    Medium,
    /// More than 20 buildings.
    High,
}

impl BuildingDensity {
    /// Classify a building count.
    pub const fn from_count(count: usize) -> Self {
        match count {
            0..=9 => Self::Low,
            10..=20 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Fire multiplier for this density.
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Low => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.5,
        }
    }

    /// Wire name of this density.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Tunables for the generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityParams {
    /// Base accident probability per tick.
    pub accident_base_rate: f64,
    /// Base fire probability per tick.
    pub fire_base_rate: f64,
    /// Upper bound on the accident probability.
    pub accident_cap: f64,
    /// Upper bound on the fire probability.
    pub fire_cap: f64,
}

impl Default for ProbabilityParams {
    fn default() -> Self {
        Self {
            accident_base_rate: 0.02,
            fire_base_rate: 0.01,
            accident_cap: 0.75,
            fire_cap: 0.5,
        }
    }
}

/// One contributing factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    /// Factor name (`base_rate`, `weather`, ...).
    pub name: String,
    /// Value the factor resolved to (`rain`, `true`, `high`, ...).
    pub label: String,
    /// Multiplier, or the base rate itself.
    pub value: f64,
}

impl Factor {
    fn new(name: &str, label: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.to_owned(),
            label: label.into(),
            value,
        }
    }
}

/// A computed probability and the factors that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Emergency kind assessed.
    pub kind: EmergencyKind,
    /// Probability in `[0, 1]`.
    pub probability: f64,
    /// Base rate followed by each multiplier, in multiplication order.
    pub factors: Vec<Factor>,
    /// Whether the cap was applied.
    pub capped: bool,
}

fn combine(kind: EmergencyKind, factors: Vec<Factor>, cap: f64) -> Assessment {
    let raw = factors.iter().map(|f| f.value).product::<f64>();
    let bound = cap.clamp(0.0, 1.0);
    let capped = raw > bound;
    Assessment {
        kind,
        probability: raw.clamp(0.0, bound),
        factors,
        capped,
    }
}

/// Accident probability from explicit conditions.
pub fn accident_probability(
    params: &ProbabilityParams,
    weather_now: Weather,
    rush_hour: bool,
    traffic: TrafficLevel,
) -> Assessment {
    combine(
        EmergencyKind::Accident,
        vec![
            Factor::new("base_rate", "accident", params.accident_base_rate),
            Factor::new("weather", weather_now.as_str(), weather::accident_multiplier(weather_now)),
            Factor::new("rush_hour", rush_hour.to_string(), rush_hour_multiplier(rush_hour)),
            Factor::new("traffic", traffic.as_str(), traffic.multiplier()),
        ],
        params.accident_cap,
    )
}

/// Fire probability from explicit conditions.
pub fn fire_probability(
    params: &ProbabilityParams,
    weather_now: Weather,
    density: BuildingDensity,
) -> Assessment {
    combine(
        EmergencyKind::Fire,
        vec![
            Factor::new("base_rate", "fire", params.fire_base_rate),
            Factor::new("weather", weather_now.as_str(), weather::fire_multiplier(weather_now)),
            Factor::new("building_density", density.as_str(), density.multiplier()),
        ],
        params.fire_cap,
    )
}

/// Whether a draw spawns an emergency. The draw must fall strictly below
/// the probability, so zero never spawns.
pub const fn decide(assessment: &Assessment, draw: f64) -> bool {
    draw < assessment.probability
}

/// Reasoning entry for a spawn decision.
pub fn explain_spawn(assessment: &Assessment, draw: f64) -> ReasoningContext {
    let mut context = ReasoningContext::new(
        EngineId::Probabilistic,
        format!("spawn_{}", assessment.kind),
    )
    .step(format!(
        "P({}) = {} = {:.4}",
        assessment.kind,
        assessment
            .factors
            .iter()
            .map(|f| format!("{}[{}] {}", f.name, f.label, f.value))
            .collect::<Vec<_>>()
            .join(" x "),
        assessment.probability
    ))
    .step(format!("draw {draw:.4} < {:.4}", assessment.probability))
    .inputs(json!({ "factors": assessment.factors, "capped": assessment.capped }))
    .outputs(json!({ "probability": assessment.probability, "draw": draw, "spawn": true }))
    .confidence(assessment.probability);
    if assessment.capped {
        context = context.step("probability capped");
    }
    context
}

/// Seeded source of spawn decisions.
#[derive(Debug, Clone)]
pub struct EventGenerator {
    params: ProbabilityParams,
    seed: u64,
    rng: StdRng,
}

impl EventGenerator {
    /// Create a generator with its own seeded stream.
    pub fn new(params: ProbabilityParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The configured parameters.
    pub const fn params(&self) -> &ProbabilityParams {
        &self.params
    }

    /// Assess both kinds for the current conditions.
    pub fn assess(
        &self,
        tick: u64,
        weather_now: Weather,
        moving_vehicles: u32,
        building_count: usize,
    ) -> [Assessment; 2] {
        [
            accident_probability(
                &self.params,
                weather_now,
                is_rush_hour(tick),
                TrafficLevel::from_moving(moving_vehicles),
            ),
            fire_probability(
                &self.params,
                weather_now,
                BuildingDensity::from_count(building_count),
            ),
        ]
    }

    /// Draw a uniform value in `[0, 1)`.
    pub fn draw(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Draw a severity in `3..=10`.
    pub fn severity(&mut self) -> u8 {
        self.rng.random_range(3..=10)
    }

    /// Mutable access to the stream, for spawn placement.
    pub const fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Rewind to the configured seed.
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;

    #[test]
    fn rainy_rush_hour_heavy_traffic() {
        let params = ProbabilityParams::default();
        let a = accident_probability(&params, Weather::Rain, true, TrafficLevel::High);
        assert!((a.probability - 0.18).abs() < 1e-9);
        assert_eq!(a.factors.len(), 4);
        let names: Vec<_> = a.factors.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["base_rate", "weather", "rush_hour", "traffic"]);
        assert!(decide(&a, 0.17));
        assert!(!decide(&a, 0.19));
        assert!(!decide(&a, a.probability));

        let reason = explain_spawn(&a, 0.17);
        assert_eq!(reason.engine, EngineId::Probabilistic);
        assert_eq!(reason.decision, "spawn_accident");
        assert!(reason.steps[0].contains("rain"));
        assert!(reason.steps[0].contains("traffic[high]"));
    }

    #[test]
    fn zero_probability_never_spawns() {
        let params = ProbabilityParams {
            accident_base_rate: 0.0,
            ..ProbabilityParams::default()
        };
        let a = accident_probability(&params, Weather::Snow, true, TrafficLevel::High);
        assert!(!decide(&a, 0.0));
    }

    #[test]
    fn probability_is_capped() {
        let params = ProbabilityParams {
            accident_base_rate: 0.5,
            ..ProbabilityParams::default()
        };
        let a = accident_probability(&params, Weather::Snow, true, TrafficLevel::High);
        assert!((a.probability - 0.75).abs() < f64::EPSILON);
        assert!(a.capped);
    }

    #[test]
    fn fire_factors() {
        let params = ProbabilityParams::default();
        let f = fire_probability(&params, Weather::Clear, BuildingDensity::High);
        assert!((f.probability - 0.018).abs() < 1e-9);
        let wet = fire_probability(&params, Weather::Rain, BuildingDensity::High);
        assert!(wet.probability < f.probability);
    }

    #[test]
    fn rush_hour_windows() {
        assert!(!is_rush_hour(199));
        assert!(is_rush_hour(200));
        assert!(is_rush_hour(300));
        assert!(!is_rush_hour(301));
        assert!(is_rush_hour(1650));
    }

    #[test]
    fn traffic_and_density_tables() {
        assert_eq!(TrafficLevel::from_moving(2), TrafficLevel::Low);
        assert_eq!(TrafficLevel::from_moving(5), TrafficLevel::Medium);
        assert_eq!(TrafficLevel::from_moving(6), TrafficLevel::High);
        assert_eq!(BuildingDensity::from_count(9), BuildingDensity::Low);
        assert_eq!(BuildingDensity::from_count(20), BuildingDensity::Medium);
        assert_eq!(BuildingDensity::from_count(21), BuildingDensity::High);
    }

    #[test]
    fn same_seed_same_draws() {
        let mut a = EventGenerator::new(ProbabilityParams::default(), 11);
        let mut b = EventGenerator::new(ProbabilityParams::default(), 11);
        let da: Vec<f64> = (0..5).map(|_| a.draw()).collect();
        let db: Vec<f64> = (0..5).map(|_| b.draw()).collect();
        assert_eq!(da, db);
        a.reseed();
        assert!((a.draw() - da[0]).abs() < f64::EPSILON);
        assert!(da.iter().all(|d| (0.0..1.0).contains(d)));
    }
}
