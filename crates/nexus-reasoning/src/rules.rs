//! Condition/action rule engine.
//!
//! Rules are pure: a predicate and a description template over a typed
//! context. The engine builds no contexts itself; the orchestrator hands
//! it one [`RuleContext`] per vehicle, per building, and one for the city
//! as a whole. Each rule pattern-matches on the variant it cares about.
//!
//! A firing rule emits exactly one event. Persistent conditions re-fire
//! on every evaluation cycle unless a cooldown is configured.

use std::collections::BTreeMap;

use nexus_types::{Building, EngineId, Event, EventType, Severity, Vehicle, VehicleStatus, Weather};
use serde_json::json;
use tracing::debug;

use crate::output::{EngineOutput, ReasoningContext};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Vehicle energy below which a low-energy warning fires.
pub const LOW_ENERGY: f64 = 25.0;

/// Vehicle health below which a critical-health alert fires.
pub const CRITICAL_HEALTH: f64 = 30.0;

/// Power ratio (percent) below which a CRITICAL building is underpowered.
pub const CRITICAL_POWER_PERCENT: f64 = 80.0;

/// Age in ticks after which an open emergency counts as backlog.
pub const BACKLOG_AGE: u64 = 50;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// City-wide aggregate handed to city rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityContext {
    /// Current tick.
    pub tick: u64,
    /// Current weather.
    pub weather: Weather,
    /// Sum of building requirements.
    pub total_demand: u64,
    /// Power capacity.
    pub capacity: u32,
    /// Vehicles following a path.
    pub moving_vehicles: u32,
    /// Emergencies not yet resolved.
    pub open_emergencies: u32,
    /// Open emergencies with no responder.
    pub unassigned_emergencies: u32,
    /// Responders free to take an assignment.
    pub available_responders: u32,
    /// Age of the oldest open emergency.
    pub oldest_open_age: u64,
}

/// The entity a rule is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum RuleContext<'a> {
    /// One vehicle.
    Vehicle(&'a Vehicle),
    /// One building.
    Building(&'a Building),
    /// The whole city.
    City(&'a CityContext),
}

impl RuleContext<'_> {
    /// Stable name of the subject, e.g. `V-3`, `B-1`, `city`.
    pub fn subject(&self) -> String {
        match self {
            Self::Vehicle(v) => v.id.to_string(),
            Self::Building(b) => b.id.to_string(),
            Self::City(_) => String::from("city"),
        }
    }
}

/// A declarative rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Short identifier, e.g. `R001`.
    pub id: &'static str,
    /// Machine-friendly name.
    pub name: &'static str,
    /// Severity of the emitted event.
    pub severity: Severity,
    /// Pure predicate.
    pub condition: fn(&RuleContext<'_>) -> bool,
    /// Description template.
    pub action: fn(&RuleContext<'_>) -> String,
}

fn is_low_energy(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::Vehicle(v) if v.energy < LOW_ENERGY)
}

fn low_energy_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::Vehicle(v) => format!("{} {} energy low ({:.1})", v.class, v.id, v.energy),
        _ => String::new(),
    }
}

fn is_critical_health(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::Vehicle(v) if v.health < CRITICAL_HEALTH)
}

fn critical_health_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::Vehicle(v) => format!("{} {} health critical ({:.1})", v.class, v.id, v.health),
        _ => String::new(),
    }
}

fn is_stuck(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::Vehicle(v) if v.status == VehicleStatus::Stuck)
}

fn stuck_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::Vehicle(v) => format!("{} {} is stuck at {}", v.class, v.id, v.pos),
        _ => String::new(),
    }
}

fn is_critical_underpowered(ctx: &RuleContext<'_>) -> bool {
    matches!(
        ctx,
        RuleContext::Building(b)
            if b.priority == nexus_types::PriorityClass::Critical
                && b.power_ratio_percent() < CRITICAL_POWER_PERCENT
    )
}

fn critical_underpowered_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::Building(b) => format!(
            "{} {} underpowered: {} of {} units",
            b.building_type, b.id, b.allocated_power, b.power_requirement
        ),
        _ => String::new(),
    }
}

fn is_power_deficit(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::City(c) if c.total_demand > u64::from(c.capacity))
}

fn power_deficit_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::City(c) => format!(
            "Power demand {} exceeds capacity {}",
            c.total_demand, c.capacity
        ),
        _ => String::new(),
    }
}

fn is_responder_shortage(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::City(c) if c.unassigned_emergencies > c.available_responders)
}

fn responder_shortage_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::City(c) => format!(
            "{} unassigned emergencies but only {} responders available",
            c.unassigned_emergencies, c.available_responders
        ),
        _ => String::new(),
    }
}

fn is_backlog(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::City(c) if c.open_emergencies > 0 && c.oldest_open_age > BACKLOG_AGE)
}

fn backlog_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::City(c) => format!(
            "Emergency backlog: {} open, oldest waiting {} ticks",
            c.open_emergencies, c.oldest_open_age
        ),
        _ => String::new(),
    }
}

fn is_hazardous_weather(ctx: &RuleContext<'_>) -> bool {
    matches!(ctx, RuleContext::City(c) if c.weather == Weather::Snow && c.moving_vehicles > 0)
}

fn hazardous_weather_text(ctx: &RuleContext<'_>) -> String {
    match ctx {
        RuleContext::City(c) => format!(
            "Snow on the roads with {} vehicles moving, expect slow travel",
            c.moving_vehicles
        ),
        _ => String::new(),
    }
}

/// The built-in rule set.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "R001",
            name: "low_energy",
            severity: Severity::Warning,
            condition: is_low_energy,
            action: low_energy_text,
        },
        Rule {
            id: "R002",
            name: "critical_health",
            severity: Severity::Critical,
            condition: is_critical_health,
            action: critical_health_text,
        },
        Rule {
            id: "R003",
            name: "vehicle_stuck",
            severity: Severity::Warning,
            condition: is_stuck,
            action: stuck_text,
        },
        Rule {
            id: "R004",
            name: "critical_underpowered",
            severity: Severity::Critical,
            condition: is_critical_underpowered,
            action: critical_underpowered_text,
        },
        Rule {
            id: "R005",
            name: "power_deficit",
            severity: Severity::Info,
            condition: is_power_deficit,
            action: power_deficit_text,
        },
        Rule {
            id: "R006",
            name: "responder_shortage",
            severity: Severity::Critical,
            condition: is_responder_shortage,
            action: responder_shortage_text,
        },
        Rule {
            id: "R007",
            name: "emergency_backlog",
            severity: Severity::Warning,
            condition: is_backlog,
            action: backlog_text,
        },
        Rule {
            id: "R008",
            name: "hazardous_weather",
            severity: Severity::Info,
            condition: is_hazardous_weather,
            action: hazardous_weather_text,
        },
    ]
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Evaluates a rule set at a configured interval.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    interval_ticks: u64,
    cooldown_ticks: u64,
    last_fired: BTreeMap<(&'static str, String), u64>,
}

impl RuleEngine {
    /// Engine with the built-in rules.
    ///
    /// `interval_ticks` of 0 or 1 evaluates every tick. `cooldown_ticks`
    /// of 0 disables suppression.
    pub fn new(interval_ticks: u64, cooldown_ticks: u64) -> Self {
        Self::with_rules(default_rules(), interval_ticks, cooldown_ticks)
    }

    /// Engine with a custom rule set.
    pub const fn with_rules(rules: Vec<Rule>, interval_ticks: u64, cooldown_ticks: u64) -> Self {
        Self {
            rules,
            interval_ticks,
            cooldown_ticks,
            last_fired: BTreeMap::new(),
        }
    }

    /// The loaded rules.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether `tick` is an evaluation tick.
    pub const fn is_due(&self, tick: u64) -> bool {
        match tick.checked_rem(self.interval_ticks) {
            Some(r) => r == 0,
            None => true,
        }
    }

    fn suppressed(&self, key: &(&'static str, String), tick: u64) -> bool {
        self.cooldown_ticks > 0
            && self
                .last_fired
                .get(key)
                .is_some_and(|&last| tick.saturating_sub(last) < self.cooldown_ticks)
    }

    /// Evaluate every rule against every context.
    pub fn evaluate(&mut self, tick: u64, contexts: &[RuleContext<'_>]) -> EngineOutput {
        let mut out = EngineOutput::new();
        let mut fired: Vec<String> = Vec::new();

        for ctx in contexts {
            for rule in &self.rules {
                if !(rule.condition)(ctx) {
                    continue;
                }
                let subject = ctx.subject();
                let key = (rule.id, subject.clone());
                if self.suppressed(&key, tick) {
                    continue;
                }
                out.event(Event::new(
                    tick,
                    EventType::RuleFired,
                    rule.severity,
                    (rule.action)(ctx),
                    json!({ "rule_id": rule.id, "rule_name": rule.name, "subject": subject }),
                ));
                fired.push(format!("{} {} fired for {subject}", rule.id, rule.name));
                self.last_fired.insert(key, tick);
            }
        }

        if !fired.is_empty() {
            debug!(tick, fired = fired.len(), "rules fired");
            let mut context = ReasoningContext::new(EngineId::Rules, "rules_fired")
                .inputs(json!({ "contexts": contexts.len(), "rules": self.rules.len() }))
                .outputs(json!({ "fired": fired.len() }))
                .confidence(1.0);
            for f in fired {
                context = context.step(f);
            }
            out.reason(context);
        }
        out
    }

    /// Forget cooldown history.
    pub fn reset(&mut self) {
        self.last_fired.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use nexus_types::{BuildingId, BuildingType, GridPos, VehicleClass, VehicleId};

    use super::*;

    fn vehicle(energy: f64, health: f64) -> Vehicle {
        let mut v = Vehicle::new(VehicleId(1), VehicleClass::Normal, GridPos::new(1, 1), 50.0, energy);
        v.health = health;
        v
    }

    fn calm_city() -> CityContext {
        CityContext {
            tick: 0,
            weather: Weather::Clear,
            total_demand: 500,
            capacity: 1000,
            moving_vehicles: 2,
            open_emergencies: 0,
            unassigned_emergencies: 0,
            available_responders: 2,
            oldest_open_age: 0,
        }
    }

    #[test]
    fn healthy_world_fires_nothing() {
        let mut engine = RuleEngine::new(1, 0);
        let v = vehicle(90.0, 100.0);
        let city = calm_city();
        let out = engine.evaluate(0, &[RuleContext::Vehicle(&v), RuleContext::City(&city)]);
        assert!(out.is_empty());
    }

    #[test]
    fn multiple_rules_fire_for_one_entity() {
        let mut engine = RuleEngine::new(1, 0);
        let v = vehicle(10.0, 20.0);
        let out = engine.evaluate(3, &[RuleContext::Vehicle(&v)]);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].severity, Severity::Warning);
        assert_eq!(out.events[1].severity, Severity::Critical);
        assert_eq!(out.events[0].payload["rule_id"], "R001");
        assert_eq!(out.reasoning.len(), 1);
    }

    #[test]
    fn persistent_condition_refires_without_cooldown() {
        let mut engine = RuleEngine::new(1, 0);
        let v = vehicle(10.0, 100.0);
        for tick in 0..3 {
            let out = engine.evaluate(tick, &[RuleContext::Vehicle(&v)]);
            assert_eq!(out.events.len(), 1);
        }
    }

    #[test]
    fn cooldown_suppresses_repeats() {
        let mut engine = RuleEngine::new(1, 5);
        let v = vehicle(10.0, 100.0);
        assert_eq!(engine.evaluate(0, &[RuleContext::Vehicle(&v)]).events.len(), 1);
        assert!(engine.evaluate(4, &[RuleContext::Vehicle(&v)]).events.is_empty());
        assert_eq!(engine.evaluate(5, &[RuleContext::Vehicle(&v)]).events.len(), 1);
    }

    #[test]
    fn underpowered_critical_building() {
        let mut engine = RuleEngine::new(1, 0);
        let mut b = Building::new(BuildingId(1), BuildingType::Hospital, GridPos::new(0, 0), 100);
        b.allocated_power = 79;
        let out = engine.evaluate(0, &[RuleContext::Building(&b)]);
        assert_eq!(out.events.len(), 1);
        assert!(out.events[0].description.contains("79 of 100"));
        b.allocated_power = 80;
        assert!(engine.evaluate(1, &[RuleContext::Building(&b)]).is_empty());
    }

    #[test]
    fn city_rules_match_only_city_context() {
        let mut engine = RuleEngine::new(1, 0);
        let city = CityContext {
            weather: Weather::Snow,
            total_demand: 1200,
            unassigned_emergencies: 3,
            available_responders: 1,
            open_emergencies: 3,
            oldest_open_age: 60,
            ..calm_city()
        };
        let out = engine.evaluate(0, &[RuleContext::City(&city)]);
        let names: Vec<_> = out
            .events
            .iter()
            .map(|e| e.payload["rule_name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            vec!["power_deficit", "responder_shortage", "emergency_backlog", "hazardous_weather"]
        );
    }

    #[test]
    fn interval_gates_evaluation() {
        let engine = RuleEngine::new(5, 0);
        assert!(engine.is_due(0));
        assert!(!engine.is_due(3));
        assert!(engine.is_due(10));
        assert!(RuleEngine::new(0, 0).is_due(7));
    }
}
