//! Tick cycle: the fixed-order phase loop that drives the Nexus simulation.
//!
//! Each tick runs the steps of [`TICK_ORDER`] to completion:
//!
//! 1. **Housekeeping** -- lift expired road closures, prune emergencies
//!    resolved last tick, age open emergencies.
//! 2. **Probabilistic** -- the generator decides whether an accident or
//!    fire occurs.
//! 3. **Routing** -- idle civilians may pick a destination; every
//!    unassigned vehicle with a destination but no path is routed.
//! 4. **Movement** -- each moving vehicle consumes one path cell, paying
//!    energy and weather wear; idle vehicles recover energy.
//! 5. **Rules** -- the rule engine evaluates vehicles, buildings and the
//!    city aggregate (at its configured interval).
//! 6. **Allocation** -- the power allocator runs every K ticks.
//! 7. **Planner** -- each new emergency gets a plan, then every active
//!    plan advances by one primitive task.
//! 8. **Explainability** -- reasoning collected above is rendered and
//!    retained.
//!
//! Engines are the closed set of [`EngineId`] variants. Each engine step
//! dispatches on its id and yields an [`EngineOutput`]; an
//! [`EngineError`] becomes a critical `engine_fault` event and the
//! remaining steps still run. Publishing is left to the orchestrator.

use nexus_reasoning::{
    EngineError, EngineOutput, EventGenerator, Explainer, PlanWorld, Planner, RuleContext,
    RuleEngine, allocation, probability,
};
use nexus_types::{
    EmergencyId, EngineId, Event, EventType, GridPos, ReasoningLogEntry, Severity, VehicleId,
    VehicleStatus, Weather,
};
use nexus_world::{Algorithm, Router, weather};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::state::CityState;

/// Energy spent per cell moved.
pub const ENERGY_PER_CELL: f64 = 0.5;

/// Energy regained per idle tick.
pub const IDLE_RECOVERY: f64 = 0.2;

/// Draws allowed when placing a new emergency.
pub const SPAWN_ATTEMPTS: u32 = 50;

/// Severity at or above which a spawn is reported as critical.
const CRITICAL_SEVERITY: u8 = 8;

/// One step of the tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    /// Closures, pruning and ageing.
    Housekeeping,
    /// Vehicles consume one path cell.
    Movement,
    /// A reasoning engine, dispatched by id.
    Engine(EngineId),
}

/// The fixed step order of every tick.
pub const TICK_ORDER: [TickStep; 8] = [
    TickStep::Housekeeping,
    TickStep::Engine(EngineId::Probabilistic),
    TickStep::Engine(EngineId::Routing),
    TickStep::Movement,
    TickStep::Engine(EngineId::Rules),
    TickStep::Engine(EngineId::Allocation),
    TickStep::Engine(EngineId::Planner),
    TickStep::Engine(EngineId::Explainability),
];

/// The stateful engines the tick cycle drives.
#[derive(Debug, Clone)]
pub struct Engines {
    /// Route search with per-algorithm statistics.
    pub router: Router,
    /// Emergency spawn model.
    pub generator: EventGenerator,
    /// Rule set and cooldown history.
    pub rules: RuleEngine,
    /// Active response plans.
    pub planner: Planner,
    /// Reasoning history.
    pub explainer: Explainer,
}

impl Engines {
    /// Build every engine from configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let params = probability::ProbabilityParams {
            accident_base_rate: config.probability.accident_base_rate,
            fire_base_rate: config.probability.fire_base_rate,
            accident_cap: config.probability.accident_cap,
            fire_cap: config.probability.fire_cap,
        };
        Self {
            router: Router::new(),
            generator: EventGenerator::new(params, config.world.seed.wrapping_add(1)),
            rules: RuleEngine::new(
                config.rules.evaluation_interval_ticks,
                config.rules.cooldown_ticks,
            ),
            planner: Planner::new(Algorithm::AStar),
            explainer: Explainer::new(config.history.reasoning_capacity),
        }
    }

    /// Forget all run-specific state and rewind the spawn stream.
    pub fn reset(&mut self) {
        self.router.reset();
        self.generator.reseed();
        self.rules.reset();
        self.planner.reset();
        self.explainer.clear();
    }
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Weather during the tick.
    pub weather: Weather,
    /// Emergencies spawned this tick.
    pub spawned: Vec<EmergencyId>,
    /// Vehicles that received a new path.
    pub routed: u32,
    /// Vehicles that moved one cell.
    pub moved: u32,
    /// Vehicles with no path to their destination.
    pub stuck: u32,
    /// Rule firings.
    pub rules_fired: u32,
    /// Whether the allocator ran.
    pub reallocated: bool,
    /// Plans still active after the planning phase.
    pub active_plans: u32,
    /// Engines that faulted, each listed once.
    pub faults: Vec<EngineId>,
}

/// Everything a tick produced.
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Counters.
    pub summary: TickSummary,
    /// Events in emission order.
    pub events: Vec<Event>,
    /// Rendered reasoning entries in emission order.
    pub reasoning: Vec<ReasoningLogEntry>,
}

/// Accumulates engine output and turns faults into events.
struct Collector {
    tick: u64,
    output: EngineOutput,
    faults: Vec<EngineId>,
}

impl Collector {
    const fn new(tick: u64) -> Self {
        Self {
            tick,
            output: EngineOutput::new(),
            faults: Vec::new(),
        }
    }

    fn guard(&mut self, engine: EngineId, result: Result<EngineOutput, EngineError>) {
        match result {
            Ok(out) => self.output.absorb(out),
            Err(e) => self.fault(engine, &e),
        }
    }

    /// Record a recovered fault as a critical event.
    fn fault(&mut self, engine: EngineId, e: &EngineError) {
        error!(tick = self.tick, %engine, error = %e, "engine fault, continuing tick");
        if !self.faults.contains(&engine) {
            self.faults.push(engine);
        }
        self.output.event(Event::new(
            self.tick,
            EventType::EngineFault,
            Severity::Critical,
            format!("{engine} engine fault: {e}"),
            json!({ "engine": engine, "error": e.to_string() }),
        ));
    }
}

/// One tick in progress.
struct TickRun<'a> {
    tick: u64,
    state: &'a mut CityState,
    engines: &'a mut Engines,
    config: &'a SimulationConfig,
    summary: TickSummary,
    collector: Collector,
    reasoning: Vec<ReasoningLogEntry>,
}

impl TickRun<'_> {
    fn step(&mut self, step: TickStep) {
        match step {
            TickStep::Housekeeping => {
                let out = phase_housekeeping(self.state, self.tick);
                self.collector.output.absorb(out);
            }
            TickStep::Movement => self.summary.moved = phase_movement(self.state),
            TickStep::Engine(engine) => {
                let result = self.evaluate(engine);
                self.collector.guard(engine, result);
            }
        }
    }

    /// Run one engine against the world.
    fn evaluate(&mut self, engine: EngineId) -> Result<EngineOutput, EngineError> {
        match engine {
            EngineId::Probabilistic => phase_spawn(
                self.state,
                &mut self.engines.generator,
                self.tick,
                &mut self.summary.spawned,
            ),
            EngineId::Routing => Ok(phase_routing(
                self.state,
                &mut self.engines.router,
                self.config.fleet.wander_probability,
                &mut self.summary,
                &mut self.collector,
            )),
            EngineId::Rules => Ok(self.rules()),
            EngineId::Allocation => self.allocation(),
            EngineId::Planner => Ok(self.plan()),
            EngineId::Explainability => {
                self.flush();
                Ok(EngineOutput::new())
            }
        }
    }

    fn rules(&mut self) -> EngineOutput {
        if !self.engines.rules.is_due(self.tick) {
            return EngineOutput::new();
        }
        let city_ctx = self
            .state
            .city_context(self.tick, self.config.power.total_capacity);
        let mut contexts: Vec<RuleContext<'_>> = self
            .state
            .vehicles
            .values()
            .map(RuleContext::Vehicle)
            .collect();
        contexts.extend(self.state.city.buildings().map(RuleContext::Building));
        contexts.push(RuleContext::City(&city_ctx));
        let out = self.engines.rules.evaluate(self.tick, &contexts);
        self.summary.rules_fired = u32::try_from(
            out.events
                .iter()
                .filter(|e| e.event_type == EventType::RuleFired)
                .count(),
        )
        .unwrap_or(u32::MAX);
        out
    }

    fn allocation(&mut self) -> Result<EngineOutput, EngineError> {
        if self
            .tick
            .checked_rem(self.config.power.reallocation_interval_ticks)
            != Some(0)
        {
            return Ok(EngineOutput::new());
        }
        let out = allocation::reallocate(
            &mut self.state.city,
            self.config.power.total_capacity,
            self.tick,
        );
        self.summary.reallocated = out.is_ok();
        out
    }

    /// Plan new emergencies, then advance every active plan.
    fn plan(&mut self) -> EngineOutput {
        let mut out = EngineOutput::new();
        for id in &self.summary.spawned {
            let Some(emergency) = self.state.emergencies.get(id) else {
                continue;
            };
            match self.engines.planner.create(emergency, self.tick) {
                Ok(context) => out.reason(context),
                Err(e) => self.collector.fault(EngineId::Planner, &e),
            }
        }
        let mut world = PlanWorld {
            city: &self.state.city,
            router: &mut self.engines.router,
            vehicles: &mut self.state.vehicles,
            emergencies: &mut self.state.emergencies,
        };
        out.absorb(self.engines.planner.advance_all(&mut world, self.tick));
        self.summary.active_plans =
            u32::try_from(self.engines.planner.active_count()).unwrap_or(u32::MAX);
        out
    }

    /// Render and retain everything collected so far.
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.collector.output.reasoning);
        for context in pending {
            let entry = self.engines.explainer.record(self.tick, context);
            self.reasoning.push(entry);
        }
    }

    fn finish(mut self) -> TickOutput {
        self.flush();
        let Self {
            tick,
            state,
            mut summary,
            collector,
            reasoning,
            ..
        } = self;
        summary.faults = collector.faults;
        state.tick = tick;

        if !summary.spawned.is_empty() || !summary.faults.is_empty() {
            info!(
                tick,
                spawned = summary.spawned.len(),
                faults = summary.faults.len(),
                active_plans = summary.active_plans,
                "tick completed"
            );
        } else {
            debug!(tick, moved = summary.moved, routed = summary.routed, "tick completed");
        }

        TickOutput {
            summary,
            events: collector.output.events,
            reasoning,
        }
    }
}

/// Execute one tick and advance the counter by exactly one.
pub fn run_tick(
    state: &mut CityState,
    engines: &mut Engines,
    config: &SimulationConfig,
) -> TickOutput {
    let tick = state.tick.saturating_add(1);
    let summary = TickSummary {
        tick,
        weather: state.city.weather(),
        ..TickSummary::default()
    };
    debug!(tick, weather = %summary.weather, "tick started");
    let mut run = TickRun {
        tick,
        state,
        engines,
        config,
        summary,
        collector: Collector::new(tick),
        reasoning: Vec::new(),
    };
    for step in TICK_ORDER {
        run.step(step);
    }
    run.finish()
}

/// Lift expired closures, prune and age emergencies.
fn phase_housekeeping(state: &mut CityState, tick: u64) -> EngineOutput {
    let mut out = EngineOutput::new();
    for segment in state.city.expire_blockages(tick) {
        debug!(tick, pos = %segment.pos, "closure expired");
        out.event(Event::new(
            tick,
            EventType::RoadUnblocked,
            Severity::Info,
            format!("Road at {} reopened after closure ({})", segment.pos, segment.reason),
            json!({ "pos": segment.pos, "reason": segment.reason, "expired": true }),
        ));
    }
    let pruned = state.prune_resolved();
    if pruned > 0 {
        debug!(tick, pruned, "resolved emergencies pruned");
    }
    for emergency in state.emergencies.values_mut() {
        emergency.age = tick.saturating_sub(emergency.reported_tick);
    }
    out
}

/// Roll for accidents and fires. Spawned ids are appended to `spawned`
/// as they are inserted, so a later failure keeps earlier ones planned.
fn phase_spawn(
    state: &mut CityState,
    generator: &mut EventGenerator,
    tick: u64,
    spawned: &mut Vec<EmergencyId>,
) -> Result<EngineOutput, EngineError> {
    let mut out = EngineOutput::new();
    let assessments = generator.assess(
        tick,
        state.city.weather(),
        state.moving_vehicles(),
        state.city.building_count(),
    );

    for assessment in assessments {
        let draw = generator.draw();
        if !probability::decide(&assessment, draw) {
            continue;
        }
        let Some(pos) = state
            .city
            .random_drivable_cell(generator.rng(), SPAWN_ATTEMPTS)
        else {
            warn!(tick, kind = %assessment.kind, "no free cell for emergency, spawn skipped");
            continue;
        };
        let id = state
            .allocate_emergency_id()
            .ok_or(EngineError::ArithmeticOverflow(EngineId::Probabilistic))?;
        let severity = generator.severity();
        let emergency = nexus_types::Emergency::new(id, assessment.kind, pos, severity, tick);

        info!(tick, emergency = %id, kind = %assessment.kind, %pos, severity, p = assessment.probability, "emergency spawned");
        out.event(Event::new(
            tick,
            EventType::EmergencySpawned,
            if severity >= CRITICAL_SEVERITY {
                Severity::Critical
            } else {
                Severity::Warning
            },
            format!("{} {id} reported at {pos}, severity {severity}", assessment.kind),
            json!({
                "emergency": id,
                "kind": assessment.kind,
                "pos": pos,
                "severity": severity,
                "probability": assessment.probability,
            }),
        ));
        out.reason(probability::explain_spawn(&assessment, draw));
        state.emergencies.insert(id, emergency);
        spawned.push(id);
    }
    Ok(out)
}

/// Route every unassigned vehicle that has somewhere to be but no path
/// to get there. A vehicle whose request the router rejects is parked
/// and recorded as a fault; the others are still routed.
fn phase_routing(
    state: &mut CityState,
    router: &mut Router,
    wander_probability: f64,
    summary: &mut TickSummary,
    collector: &mut Collector,
) -> EngineOutput {
    let tick = summary.tick;
    let mut out = EngineOutput::new();
    let started = state.wander(wander_probability);
    if !started.is_empty() {
        debug!(tick, vehicles = started.len(), "civilians set off");
    }

    let pending: Vec<(VehicleId, GridPos, GridPos)> = state
        .vehicles
        .values()
        .filter(|v| v.assignment.is_none() && v.path.is_empty())
        .filter_map(|v| v.destination.map(|d| (v.id, v.pos, d)))
        .collect();

    let mut steps = Vec::new();
    for (id, from, to) in pending {
        if from == to {
            if let Some(v) = state.vehicles.get_mut(&id) {
                v.park();
            }
            continue;
        }
        let routed = router.route(&state.city, from, to, Algorithm::AStar);
        let Some(v) = state.vehicles.get_mut(&id) else {
            continue;
        };
        let report = match routed {
            Ok(report) => report,
            Err(e) => {
                v.park();
                steps.push(format!("{id}: {from} -> {to} rejected ({e}), destination dropped"));
                collector.fault(EngineId::Routing, &EngineError::from(e));
                continue;
            }
        };
        if let Some(path) = report.path {
            steps.push(format!(
                "{id}: {from} -> {to}, {} cells, {} expanded",
                path.len(),
                report.nodes_expanded
            ));
            v.path = path.into_iter().skip(1).collect();
            v.status = if v.home == Some(to) {
                VehicleStatus::Returning
            } else {
                VehicleStatus::Moving
            };
            summary.routed = summary.routed.saturating_add(1);
        } else {
            summary.stuck = summary.stuck.saturating_add(1);
            if v.status != VehicleStatus::Stuck {
                warn!(tick, vehicle = %id, %from, %to, "no path, vehicle stuck");
                out.event(Event::new(
                    tick,
                    EventType::VehicleStuck,
                    Severity::Warning,
                    format!("{id} has no path from {from} to {to}, will retry"),
                    json!({ "vehicle": id, "from": from, "to": to }),
                ));
                steps.push(format!("{id}: {from} -> {to} unreachable, marked stuck"));
            }
            v.status = VehicleStatus::Stuck;
        }
    }

    if !steps.is_empty() {
        let mut context = nexus_reasoning::ReasoningContext::new(EngineId::Routing, "routes_assigned")
            .inputs(json!({ "algorithm": Algorithm::AStar.as_str(), "weather": state.city.weather() }))
            .outputs(json!({ "routed": summary.routed, "stuck": summary.stuck }))
            .confidence(1.0);
        for step in steps {
            context = context.step(step);
        }
        out.reason(context);
    }
    out
}

/// Advance every moving vehicle one cell. Returns how many moved.
fn phase_movement(state: &mut CityState) -> u32 {
    let wear = weather::health_wear_per_cell(state.city.weather());
    let mut moved = 0_u32;
    for v in state.vehicles.values_mut() {
        let travelling = matches!(v.status, VehicleStatus::Moving | VehicleStatus::Returning);
        let Some(next) = v.path.front().copied().filter(|_| travelling) else {
            if v.status == VehicleStatus::Idle {
                v.energy = (v.energy + IDLE_RECOVERY).clamp(0.0, 100.0);
            }
            continue;
        };
        if state.city.is_blocked(next) {
            // Closed under us; routing or the planner picks a new path.
            v.path.clear();
            v.status = VehicleStatus::Idle;
            continue;
        }
        v.path.pop_front();
        v.pos = next;
        v.energy = (v.energy - ENERGY_PER_CELL).clamp(0.0, 100.0);
        v.health = (v.health - wear).clamp(0.0, 100.0);
        moved = moved.saturating_add(1);

        if v.path.is_empty() && v.assignment.is_none() && v.destination == Some(v.pos) {
            v.park();
        }
    }
    moved
}
